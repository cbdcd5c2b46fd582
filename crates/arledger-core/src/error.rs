//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Authorization or token exchange failed.
    #[error(transparent)]
    OAuth(#[from] arledger_oauth::Error),

    /// Transport-level failure talking to the API.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API reported an error payload (usually an expired or revoked
    /// access token).
    #[error("API rejected the request: {0}")]
    AuthExpired(String),

    /// The API returned a non-success status without an error payload.
    #[error("API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response is missing expected fields.
    #[error("Malformed response: {0}")]
    InvalidResponse(String),

    /// A continuation page failed; no partial results are returned.
    #[error("Fetching page {page} failed: {source}")]
    Pagination {
        /// One-based page number.
        page: usize,
        /// Underlying failure.
        source: Box<Error>,
    },

    /// Too many attempts across refreshes and reauthorizations.
    #[error("Gave up after {0} attempts")]
    RetryBudgetExhausted(u32),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Settings file could not be parsed.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// URL error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Log file could not be written.
    #[error("Log error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel workbook could not be written.
    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    /// Email could not be built or sent.
    #[error("Email error: {0}")]
    Mail(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the process must stop instead of carrying on.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::OAuth(e) if e.is_security_violation())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_state_mismatch_is_security_violation() {
        let mismatch = Error::OAuth(arledger_oauth::Error::StateMismatch {
            expected: "issued".into(),
            received: "forged".into(),
        });
        assert!(mismatch.is_security_violation());
        assert!(!Error::OAuth(arledger_oauth::Error::Timeout(500)).is_security_violation());
        assert!(!Error::AuthExpired("token".into()).is_security_violation());
    }
}

//! Error types for `OAuth2` operations.

use std::io;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be parsed.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings file could not be written.
    #[error("Settings write error: {0}")]
    SettingsWrite(#[from] toml::ser::Error),

    /// `OAuth2` error from server.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// The state returned by the authorization redirect does not match the
    /// state sent with the authorization request.
    #[error("Authorization state mismatch (expected {expected}, received {received})")]
    StateMismatch {
        /// State generated for the authorization URL.
        expected: String,
        /// State carried by the redirect.
        received: String,
    },

    /// No tokens in the store.
    #[error("No tokens stored; run the authorization flow first")]
    NoTokens,

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Authorization timeout.
    #[error("Authorization timed out after {0} seconds")]
    Timeout(u64),

    /// User denied authorization.
    #[error("User denied authorization")]
    AccessDenied,

    /// The redirect could not be captured.
    #[error("Redirect capture failed: {0}")]
    Redirect(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns true for errors that must abort the process instead of being
    /// retried.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::StateMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mismatch_is_security_violation() {
        let err = Error::StateMismatch {
            expected: "abc".into(),
            received: "xyz".into(),
        };
        assert!(err.is_security_violation());
        assert!(!Error::AccessDenied.is_security_violation());
        assert!(!Error::Timeout(500).is_security_violation());
    }

    #[test]
    fn test_oauth_error_display() {
        let err = Error::oauth_error("invalid_grant", "refresh token revoked");
        assert_eq!(
            err.to_string(),
            "OAuth2 error: invalid_grant - refresh token revoked"
        );
    }
}

//! `OAuth2` token types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Access and refresh token issued together by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived credential sent as the bearer token.
    pub access_token: String,
    /// Long-lived credential used to obtain a new pair.
    pub refresh_token: String,
}

impl TokenPair {
    /// Creates a new token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Creates a token pair from a token endpoint response.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResponse` if either token is missing or empty.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidResponse("missing access_token".into()))?;
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidResponse("missing refresh_token".into()))?;

        Ok(Self {
            access_token,
            refresh_token,
        })
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Shortens a token for display, keeping only the first and last characters.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Token response from the `OAuth2` server.
///
/// MYOB also returns `token_type`, `expires_in`, `scope` and a `user` object;
/// only the two tokens are consumed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from the `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self.error.as_str() {
            "access_denied" => Error::AccessDenied,
            _ => Error::oauth_error(self.error, self.error_description),
        }
    }
}

/// Code and state captured from the authorization redirect, after the state
/// has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Authorization code to exchange for tokens.
    pub code: String,
    /// State echoed back by the provider.
    pub state: String,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pair_from_response() {
        let json = r#"{
            "access_token": "AAEAAL",
            "token_type": "bearer",
            "expires_in": "1200",
            "refresh_token": "Fvdf!IAAA",
            "scope": "CompanyFile",
            "user": { "uid": "d2c4", "username": "someone@example.com" }
        }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let pair = TokenPair::from_response(response).unwrap();
        assert_eq!(pair, TokenPair::new("AAEAAL", "Fvdf!IAAA"));
    }

    #[test]
    fn test_missing_refresh_token_is_invalid() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        let err = TokenPair::from_response(response).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.contains("refresh_token")));
    }

    #[test]
    fn test_empty_access_token_is_invalid() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "", "refresh_token": "r"}"#).unwrap();
        assert!(TokenPair::from_response(response).is_err());
    }

    #[test]
    fn test_bearer_header() {
        let pair = TokenPair::new("abc", "def");
        assert_eq!(pair.bearer(), "Bearer abc");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "*****");
        assert_eq!(mask_token("AAEAALongAccessToken1234"), "AAEAAL...1234");
    }

    #[test]
    fn test_error_response_access_denied() {
        let response = ErrorResponse {
            error: "access_denied".into(),
            error_description: String::new(),
        };
        assert!(matches!(response.into_error(), Error::AccessDenied));
    }
}

//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// MYOB account authorization endpoint.
pub const MYOB_AUTH_URL: &str = "https://secure.myob.com/oauth2/account/authorize/";

/// MYOB token endpoint (used for both code exchange and refresh).
pub const MYOB_TOKEN_URL: &str = "https://secure.myob.com/oauth2/v1/authorize/";

/// Scope granting access to `AccountRight` company files.
pub const MYOB_SCOPE: &str = "CompanyFile";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "MYOB").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Default scopes.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// MYOB `AccountRight` `OAuth2` provider configuration.
    ///
    /// Scopes:
    /// - `CompanyFile` - Access to company files the user can sign in to
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn myob() -> Result<Self> {
        Ok(Self::new("MYOB", MYOB_AUTH_URL, MYOB_TOKEN_URL)?
            .with_default_scopes(vec![MYOB_SCOPE.to_string()]))
    }

    /// Space-separated scope string sent to the provider.
    #[must_use]
    pub fn scope(&self) -> String {
        self.default_scopes.join(" ")
    }

    /// Validates that required URLs are set.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.auth_url.as_str().is_empty() {
            return Err(Error::InvalidConfig("auth_url is empty".into()));
        }
        if self.token_url.as_str().is_empty() {
            return Err(Error::InvalidConfig("token_url is empty".into()));
        }
        if self.default_scopes.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "provider {} has no scopes",
                self.name
            )));
        }
        Ok(())
    }
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
    fn test_myob_provider() {
        let provider = Provider::myob().unwrap();
        assert_eq!(provider.name, "MYOB");
        assert_eq!(provider.scope(), "CompanyFile");
        assert_eq!(provider.token_url.as_str(), MYOB_TOKEN_URL);
        provider.validate().unwrap();
    }

    #[test]
    fn test_custom_provider() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap()
        .with_default_scopes(vec!["read".to_string(), "write".to_string()]);

        assert_eq!(provider.name, "Custom");
        assert_eq!(provider.scope(), "read write");
        provider.validate().unwrap();
    }

    #[test]
    fn test_provider_without_scopes_is_invalid() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();
        assert!(matches!(
            provider.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(Provider::new("Bad", "not a url", "https://auth.example.com/token").is_err());
    }
}

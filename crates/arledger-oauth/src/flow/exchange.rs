//! Token exchange bound to a token store.

use tracing::info;

use super::OAuthClient;
use crate::error::{Error, Result};
use crate::store::TokenStore;
use crate::token::{AuthorizationResult, TokenPair};

/// Obtains token pairs from the token endpoint and persists every pair it
/// receives before handing it back.
#[derive(Debug)]
pub struct TokenExchange<S> {
    client: OAuthClient,
    store: S,
}

impl<S: TokenStore> TokenExchange<S> {
    /// Creates an exchange writing to `store`.
    #[must_use]
    pub const fn new(client: OAuthClient, store: S) -> Self {
        Self { client, store }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// The token store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Reads the current pair from the store.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoTokens` if nothing is stored, or the store's error.
    pub fn current(&self) -> Result<TokenPair> {
        self.store.load()?.ok_or(Error::NoTokens)
    }

    /// Exchanges a verified authorization code and stores the new pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange or the store write fails.
    pub async fn exchange_code(&mut self, authorization: &AuthorizationResult) -> Result<TokenPair> {
        let tokens = self.client.exchange_code(&authorization.code).await?;
        self.store.save(&tokens)?;
        info!("Token retrieved");
        Ok(tokens)
    }

    /// Refreshes with `refresh_token` and stores the new pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh or the store write fails.
    pub async fn refresh(&mut self, refresh_token: &str) -> Result<TokenPair> {
        let tokens = self.client.refresh(refresh_token).await?;
        self.store.save(&tokens)?;
        info!("Tokens successfully updated");
        Ok(tokens)
    }

    /// Refreshes using the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoTokens` if nothing is stored, or any refresh error.
    pub async fn refresh_stored(&mut self) -> Result<TokenPair> {
        let current = self.current()?;
        self.refresh(&current.refresh_token).await
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
    use crate::provider::Provider;
    use crate::store::{FileTokenStore, MemoryTokenStore};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OAuthClient {
        let provider = Provider::new(
            "Test",
            format!("{}/authorize", server.uri()),
            format!("{}/token", server.uri()),
        )
        .unwrap()
        .with_default_scopes(vec!["CompanyFile".to_string()]);
        OAuthClient::new("key", provider)
            .with_client_secret("secret")
            .with_redirect_uri("http://desktop")
    }

    fn authorization() -> AuthorizationResult {
        AuthorizationResult {
            code: "code-1".into(),
            state: "state-1".into(),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_then_store_read_returns_endpoint_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("code=code-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-access",
                "refresh_token": "fresh-refresh",
                "expires_in": "1200"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut exchange = TokenExchange::new(client(&server), FileTokenStore::new(&path));

        exchange.exchange_code(&authorization()).await.unwrap();

        let reread = FileTokenStore::new(&path).load().unwrap();
        assert_eq!(reread, Some(TokenPair::new("fresh-access", "fresh-refresh")));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "only-access"
            })))
            .mount(&server)
            .await;

        let original = TokenPair::new("a0", "r0");
        let mut exchange = TokenExchange::new(
            client(&server),
            MemoryTokenStore::with_tokens(original.clone()),
        );

        assert!(exchange.refresh_stored().await.is_err());
        assert_eq!(exchange.current().unwrap(), original);
    }

    #[tokio::test]
    async fn test_refresh_stored_uses_stored_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("refresh_token=r0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a1",
                "refresh_token": "r1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut exchange = TokenExchange::new(
            client(&server),
            MemoryTokenStore::with_tokens(TokenPair::new("a0", "r0")),
        );

        exchange.refresh_stored().await.unwrap();
        assert_eq!(exchange.current().unwrap(), TokenPair::new("a1", "r1"));
    }

    #[tokio::test]
    async fn test_current_without_tokens() {
        let server = MockServer::start().await;
        let exchange = TokenExchange::new(client(&server), MemoryTokenStore::default());
        assert!(matches!(exchange.current(), Err(Error::NoTokens)));
    }
}

//! `OAuth2` authorization flows.

mod code;
mod exchange;
pub mod redirect;

pub use code::{AuthorizationCodeFlow, DEFAULT_AUTHORIZATION_WAIT};
pub use exchange::TokenExchange;
pub use redirect::{AuthorizationAgent, ConsoleAgent, LoopbackAgent, RedirectParams, agent_for};

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, TokenPair, TokenResponse};
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider (the MYOB API key).
    pub client_id: String,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Redirect URI for authorization code flow.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the endpoint rejects the grant,
    /// or the response lacks either token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);

        debug!("Refreshing tokens at {}", self.provider.token_url);
        self.request_tokens(&params).await
    }

    /// Exchanges an authorization code for a token pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the endpoint rejects the code,
    /// or the response lacks either token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("redirect_uri is not set".into()))?;
        let scope = self.provider.scope();

        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }
        params.insert("scope", &scope);
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("grant_type", "authorization_code");

        debug!("Exchanging authorization code at {}", self.provider.token_url);
        self.request_tokens(&params).await
    }

    async fn request_tokens(&self, params: &HashMap<&str, &str>) -> Result<TokenPair> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::InvalidResponse(format!("token endpoint returned {status}: {body}")),
                ErrorResponse::into_error,
            ));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)?;
        TokenPair::from_response(token_response)
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
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OAuthClient {
        let provider = Provider::new(
            "Test",
            format!("{}/oauth2/account/authorize/", server.uri()),
            format!("{}/oauth2/v1/authorize/", server.uri()),
        )
        .unwrap()
        .with_default_scopes(vec!["CompanyFile".to_string()]);

        OAuthClient::new("test_key", provider)
            .with_client_secret("test_secret")
            .with_redirect_uri("http://desktop")
    }

    #[test]
    fn test_oauth_client_with_secret() {
        let client = OAuthClient::new("test_client_id", Provider::myob().unwrap())
            .with_client_secret("secret")
            .with_redirect_uri("http://desktop");

        assert_eq!(client.client_id, "test_client_id");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
        assert_eq!(client.redirect_uri.as_deref(), Some("http://desktop"));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_grant_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/authorize/"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("scope=CompanyFile"))
            .and(body_string_contains("client_secret=test_secret"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2Fdesktop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "token_type": "bearer",
                "expires_in": "1200"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pair = test_client(&server).exchange_code("the-code").await.unwrap();
        assert_eq!(pair, TokenPair::new("access-1", "refresh-1"));
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/authorize/"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-2",
                "refresh_token": "refresh-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pair = test_client(&server).refresh("refresh-0").await.unwrap();
        assert_eq!(pair, TokenPair::new("access-2", "refresh-2"));
    }

    #[tokio::test]
    async fn test_rejected_grant_reports_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "refresh token expired"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).refresh("stale").await.unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[tokio::test]
    async fn test_non_json_failure_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = test_client(&server).refresh("r").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_success_without_tokens_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).exchange_code("c").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_exchange_requires_redirect_uri() {
        let client = OAuthClient::new("id", Provider::myob().unwrap());
        let err = client.exchange_code("c").await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}

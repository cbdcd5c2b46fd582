//! Authorization Code Flow implementation.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use tracing::{info, warn};
use url::Url;

use super::{AuthorizationAgent, OAuthClient, RedirectParams};
use crate::error::{Error, Result};
use crate::token::AuthorizationResult;

/// How long the user gets to complete the consent step.
pub const DEFAULT_AUTHORIZATION_WAIT: Duration = Duration::from_secs(500);

/// Authorization Code Flow for `OAuth2`.
///
/// Each call to [`begin_authorization`](Self::begin_authorization) generates a
/// fresh anti-forgery state, sends the user to the consent page through an
/// [`AuthorizationAgent`], and only returns the code once the redirect's state
/// matches.
#[derive(Debug)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
    state: String,
    wait: Duration,
}

impl AuthorizationCodeFlow {
    /// Creates a new authorization code flow.
    #[must_use]
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            state: generate_state(),
            wait: DEFAULT_AUTHORIZATION_WAIT,
        }
    }

    /// Sets the bound on the interactive wait.
    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// State sent with the current authorization URL.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Builds the authorization URL for user consent.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has no redirect URI.
    pub fn authorization_url(&self) -> Result<Url> {
        let redirect_uri = self
            .client
            .redirect_uri
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("redirect_uri is not set".into()))?;

        let mut url = self.client.provider.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.client.provider.scope())
            .append_pair("state", &self.state);

        Ok(url)
    }

    /// Checks the captured redirect against the state this flow generated.
    ///
    /// # Errors
    ///
    /// Returns `Error::StateMismatch` when the states differ,
    /// `Error::AccessDenied` or `Error::OAuth` when the provider reported an
    /// error, and `Error::InvalidResponse` when no code was returned.
    pub fn verify(&self, redirect: RedirectParams) -> Result<AuthorizationResult> {
        if let Some(error) = redirect.error {
            return Err(match error.as_str() {
                "access_denied" => Error::AccessDenied,
                _ => Error::oauth_error(error, redirect.error_description.unwrap_or_default()),
            });
        }

        let received = redirect.state.unwrap_or_default();
        if received != self.state {
            return Err(Error::StateMismatch {
                expected: self.state.clone(),
                received,
            });
        }

        let code = redirect
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidResponse("redirect carried no authorization code".into()))?;

        Ok(AuthorizationResult {
            code,
            state: received,
        })
    }

    /// Runs the interactive consent step.
    ///
    /// Blocks until the agent captures the redirect or the configured wait
    /// elapses. A state mismatch is returned as `Error::StateMismatch`, which
    /// callers must treat as fatal.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the wait elapses, the agent's error if the
    /// browser step fails, or any error from [`verify`](Self::verify).
    pub async fn begin_authorization(
        &mut self,
        agent: &dyn AuthorizationAgent,
    ) -> Result<AuthorizationResult> {
        self.state = generate_state();
        let url = self.authorization_url()?;

        info!(
            "Waiting up to {}s for authorization in the browser",
            self.wait.as_secs()
        );
        let redirect = tokio::time::timeout(self.wait, agent.capture(&url))
            .await
            .map_err(|_| Error::Timeout(self.wait.as_secs()))??;

        let result = self.verify(redirect);
        match &result {
            Ok(_) => info!("Authorization code received; states match"),
            Err(e) if e.is_security_violation() => warn!("{e}"),
            Err(_) => {}
        }
        result
    }
}

/// Generates a random URL-safe state string.
fn generate_state() -> String {
    let random_bytes: [u8; 24] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
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
    use async_trait::async_trait;

    fn flow() -> AuthorizationCodeFlow {
        let client = OAuthClient::new("test_key", Provider::myob().unwrap())
            .with_redirect_uri("http://desktop");
        AuthorizationCodeFlow::new(client)
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Echoes the state from the authorization URL, or a fixed one.
    struct EchoAgent {
        forced_state: Option<&'static str>,
    }

    #[async_trait]
    impl AuthorizationAgent for EchoAgent {
        async fn capture(&self, authorization_url: &Url) -> Result<RedirectParams> {
            let state = self
                .forced_state
                .map(ToString::to_string)
                .or_else(|| query_value(authorization_url, "state"));
            Ok(RedirectParams {
                code: Some("auth-code".into()),
                state,
                ..RedirectParams::default()
            })
        }
    }

    struct StalledAgent;

    #[async_trait]
    impl AuthorizationAgent for StalledAgent {
        async fn capture(&self, _authorization_url: &Url) -> Result<RedirectParams> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_authorization_url() {
        let flow = flow();
        let url = flow.authorization_url().unwrap();

        assert!(url.as_str().starts_with("https://secure.myob.com/oauth2/account/authorize/"));
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("test_key"));
        assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&url, "scope").as_deref(), Some("CompanyFile"));
        assert_eq!(query_value(&url, "redirect_uri").as_deref(), Some("http://desktop"));
        assert_eq!(query_value(&url, "state").as_deref(), Some(flow.state()));
    }

    #[test]
    fn test_states_are_unique() {
        assert_ne!(flow().state(), flow().state());
        assert!(flow().state().len() >= 32);
    }

    #[test]
    fn test_verify_mismatched_state() {
        let flow = flow();
        let err = flow
            .verify(RedirectParams {
                code: Some("c".into()),
                state: Some("forged".into()),
                ..RedirectParams::default()
            })
            .unwrap_err();
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_verify_missing_state_is_mismatch() {
        let flow = flow();
        let err = flow
            .verify(RedirectParams {
                code: Some("c".into()),
                ..RedirectParams::default()
            })
            .unwrap_err();
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_verify_access_denied() {
        let flow = flow();
        let err = flow
            .verify(RedirectParams {
                error: Some("access_denied".into()),
                ..RedirectParams::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied));
    }

    #[test]
    fn test_verify_missing_code() {
        let flow = flow();
        let state = flow.state().to_string();
        let err = flow
            .verify(RedirectParams {
                state: Some(state),
                ..RedirectParams::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_begin_authorization_matching_state() {
        let mut flow = flow();
        let result = flow
            .begin_authorization(&EchoAgent { forced_state: None })
            .await
            .unwrap();
        assert_eq!(result.code, "auth-code");
        assert_eq!(result.state, flow.state());
    }

    #[tokio::test]
    async fn test_begin_authorization_rejects_forged_state() {
        let mut flow = flow();
        let err = flow
            .begin_authorization(&EchoAgent {
                forced_state: Some("forged"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch { ref received, .. } if received == "forged"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_authorization_times_out() {
        let mut flow = flow().with_wait(Duration::from_secs(500));
        let err = flow.begin_authorization(&StalledAgent).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(500)));
    }
}

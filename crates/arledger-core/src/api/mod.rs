//! Authenticated access to the MYOB `AccountRight` API.
//!
//! [`ApiSession`] owns the HTTP client, the token exchange and the
//! authorization agent. Every call goes through [`ApiSession::execute`],
//! which re-reads the token store before each attempt, recovers from
//! rejected tokens by refreshing or reauthorizing, and follows
//! `NextPageLink` until the collection ends.

mod page;
mod request;
mod retry;

pub use page::Page;
pub use request::PendingRequest;
pub use retry::{Recovery, RetryCounter, RetryPolicy};

use std::time::Duration;

use arledger_oauth::flow::agent_for;
use arledger_oauth::{
    AuthorizationAgent, AuthorizationCodeFlow, OAuthClient, Provider, TokenExchange, TokenPair,
    TokenStore,
};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MyobSettings;
use crate::error::{Error, Result};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-myobapi-key";
/// Header carrying the API version.
pub const API_VERSION_HEADER: &str = "x-myobapi-version";

/// Static configuration of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// API version sent with every request.
    pub api_version: String,
    /// Timeout applied to each HTTP call.
    pub request_timeout: Duration,
    /// Bound on the interactive consent step.
    pub authorization_wait: Duration,
    /// Recovery limits per logical request.
    pub policy: RetryPolicy,
}

impl SessionConfig {
    /// Configuration with default version, timeouts and policy.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_version: "v2".to_string(),
            request_timeout: Duration::from_secs(30),
            authorization_wait: arledger_oauth::flow::DEFAULT_AUTHORIZATION_WAIT,
            policy: RetryPolicy::default(),
        }
    }
}

/// Long-lived handle for talking to the API.
///
/// Built once at startup and passed by `&mut` to every operation, so one
/// session never has two calls in flight.
pub struct ApiSession<S> {
    config: SessionConfig,
    http: Client,
    exchange: TokenExchange<S>,
    agent: Box<dyn AuthorizationAgent>,
}

impl<S: TokenStore> ApiSession<S> {
    /// Creates a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: SessionConfig,
        exchange: TokenExchange<S>,
        agent: Box<dyn AuthorizationAgent>,
    ) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            http,
            exchange,
            agent,
        })
    }

    /// Creates a session from the `[MYOB]` settings, choosing the
    /// authorization agent from the redirect URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider, redirect URI or HTTP client is
    /// invalid.
    pub fn from_settings(settings: &MyobSettings, store: S) -> Result<Self> {
        let token_http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        let client = OAuthClient::new(&settings.client_id, Provider::myob()?)
            .with_client_secret(&settings.client_secret)
            .with_redirect_uri(&settings.redirect_uri)
            .with_http_client(token_http);
        let agent = agent_for(&settings.redirect_uri)?;

        let config = SessionConfig {
            api_version: settings.api_version.clone(),
            request_timeout: settings.request_timeout(),
            authorization_wait: settings.authorization_timeout(),
            ..SessionConfig::new(&settings.client_id)
        };

        Self::new(config, TokenExchange::new(client, store), agent)
    }

    /// Current stored pair.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is stored or the store cannot be read.
    pub fn tokens(&self) -> Result<TokenPair> {
        Ok(self.exchange.current()?)
    }

    /// Runs the interactive authorization and stores the new pair.
    ///
    /// # Errors
    ///
    /// Returns an error if consent is refused or times out, the state does
    /// not match, or the code exchange fails.
    pub async fn authorize(&mut self) -> Result<TokenPair> {
        let mut flow = AuthorizationCodeFlow::new(self.exchange.client().clone())
            .with_wait(self.config.authorization_wait);
        let authorization = flow.begin_authorization(self.agent.as_ref()).await?;
        Ok(self.exchange.exchange_code(&authorization).await?)
    }

    /// Refreshes the stored pair.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is stored or the refresh is rejected.
    pub async fn refresh(&mut self) -> Result<TokenPair> {
        Ok(self.exchange.refresh_stored().await?)
    }

    /// Executes `request` and returns every item across all pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be completed within the retry
    /// budget, reauthorization fails, or any page fails. No partial results
    /// are returned.
    pub async fn execute(&mut self, request: &PendingRequest) -> Result<Vec<Value>> {
        self.execute_counted(request).await.map(|(items, _)| items)
    }

    pub(crate) async fn execute_counted(
        &mut self,
        request: &PendingRequest,
    ) -> Result<(Vec<Value>, RetryCounter)> {
        let mut counter = RetryCounter::new(self.config.policy);

        loop {
            counter.record_attempt()?;
            let tokens = self.load_or_authorize().await?;

            debug!(
                attempt = counter.attempts(),
                "{} {}",
                request.method(),
                request.url()
            );
            match self.send(request, request.url(), true, &tokens).await {
                Ok(first) => {
                    let items = self.follow_pages(request, &tokens, first).await?;
                    return Ok((items, counter));
                }
                Err(Error::AuthExpired(reason)) => {
                    warn!(attempt = counter.attempts(), "Access token rejected: {reason}");
                    self.recover(&mut counter, &tokens).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load_or_authorize(&mut self) -> Result<TokenPair> {
        if let Some(tokens) = self.exchange.store().load()? {
            return Ok(tokens);
        }
        info!("No stored tokens; authorization required");
        self.authorize().await
    }

    async fn recover(&mut self, counter: &mut RetryCounter, tokens: &TokenPair) -> Result<()> {
        match counter.next_recovery() {
            Recovery::Refresh => {
                info!(refresh = counter.refreshes(), "Refreshing access token");
                if let Err(e) = self.exchange.refresh(&tokens.refresh_token).await {
                    warn!("Token refresh failed, reauthorizing: {e}");
                    counter.escalate();
                    self.authorize().await?;
                }
            }
            Recovery::Reauthorize => {
                warn!(
                    "Access token still rejected after {} refreshes, reauthorizing",
                    self.config.policy.max_refreshes
                );
                self.authorize().await?;
            }
        }
        Ok(())
    }

    async fn follow_pages(
        &self,
        request: &PendingRequest,
        tokens: &TokenPair,
        first: Page,
    ) -> Result<Vec<Value>> {
        let mut items = first.items;
        let mut next = first.next_page_link;
        let mut page = 1;

        while let Some(link) = next {
            page += 1;
            debug!(page, "Following NextPageLink");
            let result = match Url::parse(&link) {
                Ok(url) => self.send(request, &url, false, tokens).await,
                Err(e) => Err(e.into()),
            };
            let continuation = result.map_err(|source| Error::Pagination {
                page,
                source: Box::new(source),
            })?;
            items.extend(continuation.items);
            next = continuation.next_page_link;
        }

        debug!(pages = page, items = items.len(), "Collection complete");
        Ok(items)
    }

    async fn send(
        &self,
        request: &PendingRequest,
        url: &Url,
        first_page: bool,
        tokens: &TokenPair,
    ) -> Result<Page> {
        let mut builder = self
            .http
            .request(request.method().clone(), url.clone())
            .header(AUTHORIZATION, tokens.bearer())
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(API_VERSION_HEADER, &self.config.api_version);

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if first_page && !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Page::parse(status, &body)
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
pub(crate) mod tests {
    use super::*;
    use arledger_oauth::MemoryTokenStore;
    use arledger_oauth::flow::RedirectParams;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Grants consent immediately, echoing the state it was given.
    pub(crate) struct ConsentAgent;

    #[async_trait]
    impl AuthorizationAgent for ConsentAgent {
        async fn capture(&self, url: &Url) -> arledger_oauth::Result<RedirectParams> {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned());
            Ok(RedirectParams {
                code: Some("consent-code".to_string()),
                state,
                error: None,
                error_description: None,
            })
        }
    }

    /// Returns a redirect whose state was not issued by this process.
    struct ForgedStateAgent;

    #[async_trait]
    impl AuthorizationAgent for ForgedStateAgent {
        async fn capture(&self, _url: &Url) -> arledger_oauth::Result<RedirectParams> {
            Ok(RedirectParams {
                code: Some("consent-code".to_string()),
                state: Some("forged-state".to_string()),
                error: None,
                error_description: None,
            })
        }
    }

    pub(crate) fn session(
        server: &MockServer,
        store: MemoryTokenStore,
    ) -> ApiSession<MemoryTokenStore> {
        session_with_agent(server, store, Box::new(ConsentAgent))
    }

    fn session_with_agent(
        server: &MockServer,
        store: MemoryTokenStore,
        agent: Box<dyn AuthorizationAgent>,
    ) -> ApiSession<MemoryTokenStore> {
        let provider = Provider::new(
            "Test",
            format!("{}/oauth2/account/authorize/", server.uri()),
            format!("{}/oauth2/v1/authorize/", server.uri()),
        )
        .unwrap()
        .with_default_scopes(vec!["CompanyFile".to_string()]);
        let client = OAuthClient::new("api-key", provider)
            .with_client_secret("api-secret")
            .with_redirect_uri("http://desktop");

        ApiSession::new(
            SessionConfig::new("api-key"),
            TokenExchange::new(client, store),
            agent,
        )
        .unwrap()
    }

    pub(crate) fn stored(access: &str) -> MemoryTokenStore {
        MemoryTokenStore::with_tokens(TokenPair::new(access, "refresh-0"))
    }

    fn invoice_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/cf/Sale/Invoice", server.uri())).unwrap()
    }

    fn rejected() -> ResponseTemplate {
        ResponseTemplate::new(401).set_body_json(json!({
            "Errors": [{"Name": "OAuthTokenIsInvalid", "Message": "The supplied OAuth token is not valid"}]
        }))
    }

    async fn mount_refresh(server: &MockServer, access: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/authorize/"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access,
                "refresh_token": "refresh-1"
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn mount_code_exchange(server: &MockServer, access: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/authorize/"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=consent-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access,
                "refresh_token": "refresh-2"
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_pages_are_flattened_in_order() {
        let server = MockServer::start().await;
        let next = format!("{}/cf/Sale/Invoice/page2?$skip=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .and(header("Authorization", "Bearer access-0"))
            .and(header(API_KEY_HEADER, "api-key"))
            .and(header(API_VERSION_HEADER, "v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": ["a", "b"],
                "NextPageLink": next
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice/page2"))
            .and(query_param("$skip", "2"))
            .and(header("Authorization", "Bearer access-0"))
            .and(header(API_KEY_HEADER, "api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": ["c"],
                "NextPageLink": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server, stored("access-0"));
        let items = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap();

        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_four_rejections_then_success_refreshes_four_times() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .respond_with(rejected())
            .up_to_n_times(4)
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .and(header("Authorization", "Bearer access-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [{"Number": "00001"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "access-new", 4).await;

        let mut session = session(&server, stored("access-old"));
        let (items, counter) = session
            .execute_counted(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"Number": "00001"})]);
        assert_eq!(counter.attempts(), 5);
        assert_eq!(counter.total_refreshes(), 4);
        assert_eq!(counter.reauthorizations(), 0);
        assert_eq!(session.tokens().unwrap(), TokenPair::new("access-new", "refresh-1"));
    }

    #[tokio::test]
    async fn test_sixth_rejection_escalates_to_reauthorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .respond_with(rejected())
            .up_to_n_times(6)
            .expect(6)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .and(header("Authorization", "Bearer access-consented"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": [1]})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "access-refreshed", 5).await;
        mount_code_exchange(&server, "access-consented", 1).await;

        let mut session = session(&server, stored("access-old"));
        let (items, counter) = session
            .execute_counted(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap();

        assert_eq!(items, vec![json!(1)]);
        assert_eq!(counter.total_refreshes(), 5);
        assert_eq!(counter.reauthorizations(), 1);
        assert_eq!(counter.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_escalates_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .respond_with(rejected())
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .and(header("Authorization", "Bearer access-consented"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": ["ok"]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "refresh token expired"
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_code_exchange(&server, "access-consented", 1).await;

        let mut session = session(&server, stored("access-old"));
        let (items, counter) = session
            .execute_counted(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap();

        assert_eq!(items, vec![json!("ok")]);
        assert_eq!(counter.reauthorizations(), 1);
        assert_eq!(counter.attempts(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(rejected())
            .expect(3)
            .mount(&server)
            .await;
        mount_refresh(&server, "access-still-bad", 3).await;

        let mut session = session(&server, stored("access-old"));
        session.config.policy = RetryPolicy {
            max_refreshes: 5,
            max_attempts: 3,
        };
        let err = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetryBudgetExhausted(3)));
    }

    #[tokio::test]
    async fn test_failed_continuation_page_discards_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": ["a"],
                "NextPageLink": format!("{}/cf/Sale/Invoice/page2", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice/page2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server, stored("access-0"));
        let err = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap_err();

        match err {
            Error::Pagination { page, source } => {
                assert_eq!(page, 2);
                assert!(matches!(*source, Error::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_on_continuation_page_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": ["a"],
                "NextPageLink": format!("{}/cf/Sale/Invoice/page2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cf/Sale/Invoice/page2"))
            .respond_with(rejected())
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "unused", 0).await;

        let mut session = session(&server, stored("access-0"));
        let err = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Pagination { page: 2, .. }));
    }

    #[tokio::test]
    async fn test_status_without_errors_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let mut session = session(&server, stored("access-0"));
        let err = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_first_page_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountright"))
            .and(query_param("$top", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"Id": "cf-1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/accountright", server.uri())).unwrap();
        let mut session = session(&server, stored("access-0"));
        let items = session
            .execute(&PendingRequest::get(url).with_query("$top", "10"))
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"Id": "cf-1"})]);
    }

    #[tokio::test]
    async fn test_missing_tokens_trigger_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer access-consented"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": []})))
            .expect(1)
            .mount(&server)
            .await;
        mount_code_exchange(&server, "access-consented", 1).await;

        let mut session = session(&server, MemoryTokenStore::default());
        let items = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(session.tokens().unwrap().access_token, "access-consented");
    }

    async fn mount_no_token_calls(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/authorize/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_forged_state_aborts_before_code_exchange() {
        let server = MockServer::start().await;
        mount_no_token_calls(&server).await;

        let mut session =
            session_with_agent(&server, MemoryTokenStore::default(), Box::new(ForgedStateAgent));
        let err = session.authorize().await.unwrap_err();

        assert!(err.is_security_violation());
        assert!(session.tokens().is_err());
    }

    #[tokio::test]
    async fn test_forged_state_during_execute_sends_nothing() {
        let server = MockServer::start().await;
        mount_no_token_calls(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": []})))
            .expect(0)
            .mount(&server)
            .await;

        let mut session =
            session_with_agent(&server, MemoryTokenStore::default(), Box::new(ForgedStateAgent));
        let err = session
            .execute(&PendingRequest::get(invoice_url(&server)))
            .await
            .unwrap_err();

        assert!(err.is_security_violation());
        assert!(session.tokens().is_err());
    }

    #[test]
    fn test_session_from_settings() {
        let mut settings =
            crate::config::Settings::from_toml(crate::config::tests::FULL_SETTINGS).unwrap();
        settings.myob.authorization_timeout_secs = 120;
        let session = ApiSession::from_settings(&settings.myob, MemoryTokenStore::default()).unwrap();

        assert_eq!(session.config.api_key, "key");
        assert_eq!(session.config.api_version, "v2");
        assert_eq!(session.config.request_timeout, Duration::from_secs(30));
        assert_eq!(session.config.authorization_wait, Duration::from_secs(120));
        assert_eq!(session.config.policy, RetryPolicy::default());
    }
}

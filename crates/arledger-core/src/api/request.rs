//! Outbound API request description.

use reqwest::Method;
use serde_json::Value;
use url::Url;

/// One logical API call.
///
/// Built once and then shared by every attempt and every continuation page
/// of the call. Authentication headers are not part of the request; the
/// session adds them per attempt from the token store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl PendingRequest {
    /// Creates a request with no extra headers, query or body.
    #[must_use]
    pub const fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Adds a header sent with every attempt and page.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query parameter to the first page.
    ///
    /// Continuation links already carry their own query string.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Target of the first page.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Extra headers.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Query parameters for the first page.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// JSON body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_keeps_insertion_order() {
        let url = Url::parse("https://api.example.com/accountright").unwrap();
        let request = PendingRequest::get(url.clone())
            .with_header("Accept", "application/json")
            .with_query("$top", "400")
            .with_query("$orderby", "Number");

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.url(), &url);
        assert_eq!(request.headers().len(), 1);
        assert_eq!(
            request.query(),
            &[
                ("$top".to_string(), "400".to_string()),
                ("$orderby".to_string(), "Number".to_string())
            ]
        );
        assert!(request.body().is_none());
    }

    #[test]
    fn test_json_body() {
        let url = Url::parse("https://api.example.com/x").unwrap();
        let request = PendingRequest::new(Method::POST, url).with_json(json!({"a": 1}));
        assert_eq!(request.body(), Some(&json!({"a": 1})));
    }
}

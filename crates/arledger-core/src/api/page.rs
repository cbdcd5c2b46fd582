//! Response classification for one API page.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Items from one page plus the link to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Items in page order.
    pub items: Vec<Value>,
    /// Absolute URL of the next page, if the collection continues.
    pub next_page_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PageBody {
    items: Vec<Value>,
    #[serde(default)]
    next_page_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorDetail {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Page {
    /// Classifies a response body.
    ///
    /// An `Errors` member means the access token was rejected and is reported
    /// as [`Error::AuthExpired`] regardless of status. Otherwise a non-success
    /// status is [`Error::Status`]. A success body must be an object with an
    /// `Items` array or a bare array (the company file listing).
    ///
    /// # Errors
    ///
    /// Returns the classification error described above, or
    /// [`Error::InvalidResponse`] for any other shape.
    pub fn parse(status: StatusCode, body: &str) -> Result<Self> {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Err(if status.is_success() {
                Error::InvalidResponse(format!("response is not JSON: {}", excerpt(body)))
            } else {
                Error::Status {
                    status: status.as_u16(),
                    body: body.to_string(),
                }
            });
        };

        if let Some(errors) = value.get("Errors") {
            return Err(Error::AuthExpired(describe_errors(errors)));
        }

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        match value {
            Value::Array(items) => Ok(Self {
                items,
                next_page_link: None,
            }),
            Value::Object(_) => {
                let page: PageBody = serde_json::from_value(value).map_err(|e| {
                    Error::InvalidResponse(format!("expected an Items array: {e}"))
                })?;
                Ok(Self {
                    items: page.items,
                    next_page_link: page.next_page_link.filter(|link| !link.trim().is_empty()),
                })
            }
            other => Err(Error::InvalidResponse(format!(
                "unexpected response: {}",
                excerpt(&other.to_string())
            ))),
        }
    }
}

fn describe_errors(errors: &Value) -> String {
    let details: Vec<ApiErrorDetail> =
        serde_json::from_value(errors.clone()).unwrap_or_default();
    let described: Vec<String> = details
        .into_iter()
        .filter_map(|d| match (d.name, d.message) {
            (Some(name), Some(message)) => Some(format!("{name}: {message}")),
            (Some(text), None) | (None, Some(text)) => Some(text),
            (None, None) => None,
        })
        .collect();

    if described.is_empty() {
        errors.to_string()
    } else {
        described.join("; ")
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_items_with_next_link() {
        let body = json!({
            "Items": [{"Number": "1"}, {"Number": "2"}],
            "NextPageLink": "https://api.example.com/next?$skip=400",
            "Count": 900
        });
        let page = Page::parse(StatusCode::OK, &body.to_string()).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(
            page.next_page_link.as_deref(),
            Some("https://api.example.com/next?$skip=400")
        );
    }

    #[test]
    fn test_null_or_empty_link_ends_collection() {
        for link in [json!(null), json!(""), json!("  ")] {
            let body = json!({"Items": [], "NextPageLink": link});
            let page = Page::parse(StatusCode::OK, &body.to_string()).unwrap();
            assert!(page.next_page_link.is_none());
        }

        let page = Page::parse(StatusCode::OK, r#"{"Items": [1]}"#).unwrap();
        assert!(page.next_page_link.is_none());
    }

    #[test]
    fn test_bare_array_is_one_page() {
        let page = Page::parse(StatusCode::OK, r#"[{"Id": "a"}, {"Id": "b"}]"#).unwrap();
        assert_eq!(page.items, vec![json!({"Id": "a"}), json!({"Id": "b"})]);
        assert!(page.next_page_link.is_none());
    }

    #[test]
    fn test_errors_member_is_auth_expired() {
        let body = json!({
            "Errors": [{"Name": "OAuthTokenIsInvalid", "Message": "The supplied OAuth token is not valid"}]
        });
        let err = Page::parse(StatusCode::UNAUTHORIZED, &body.to_string()).unwrap_err();
        assert!(matches!(err, Error::AuthExpired(msg) if msg.starts_with("OAuthTokenIsInvalid")));

        // Some gateways report errors with a 200.
        let err = Page::parse(StatusCode::OK, r#"{"Errors": []}"#).unwrap_err();
        assert!(matches!(err, Error::AuthExpired(_)));
    }

    #[test]
    fn test_failure_status_without_errors() {
        let err = Page::parse(StatusCode::INTERNAL_SERVER_ERROR, "upstream down").unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, ref body } if body == "upstream down"));

        let err = Page::parse(StatusCode::NOT_FOUND, r#"{"Message": "no"}"#).unwrap_err();
        assert!(matches!(err, Error::Status { status: 404, .. }));
    }

    #[test]
    fn test_malformed_success_bodies() {
        for body in [r#"{"Count": 3}"#, r#"{"Items": "none"}"#, "42", "<html>"] {
            let err = Page::parse(StatusCode::OK, body).unwrap_err();
            assert!(matches!(err, Error::InvalidResponse(_)), "body {body}");
        }
    }
}

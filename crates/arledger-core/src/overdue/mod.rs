//! Overdue invoice retrieval.

mod invoice;
mod query;

pub use invoice::{CustomerRef, CustomerSummary, Invoice, Summary, parse_invoices, summarize};
pub use query::{FILTER_PARAM, OverdueQuery, build_overdue_url, invoice_endpoint};

use arledger_oauth::TokenStore;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::api::{ApiSession, PendingRequest};
use crate::error::Result;

/// Fetches the raw overdue invoice items as of `today`.
///
/// # Errors
///
/// Returns any error from building the query or executing the request.
pub async fn fetch_overdue_items<S: TokenStore>(
    session: &mut ApiSession<S>,
    invoice_base: &Url,
    query: &OverdueQuery,
    today: NaiveDate,
) -> Result<Vec<Value>> {
    let url = query.url_on(invoice_base, today)?;
    let items = session.execute(&PendingRequest::get(url)).await?;
    info!(
        count = items.len(),
        days_over = query.days_over,
        "Overdue invoices retrieved"
    );
    Ok(items)
}

/// Fetches and decodes the overdue invoices as of `today`.
///
/// # Errors
///
/// Returns any error from the request or from decoding an invoice.
pub async fn fetch_overdue<S: TokenStore>(
    session: &mut ApiSession<S>,
    invoice_base: &Url,
    query: &OverdueQuery,
    today: NaiveDate,
) -> Result<Vec<Invoice>> {
    let items = fetch_overdue_items(session, invoice_base, query, today).await?;
    parse_invoices(&items)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::tests::{session, stored};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_overdue_sends_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountright/cf-1/Sale/Invoice"))
            .and(query_param(
                FILTER_PARAM,
                "BalanceDueAmount gt 0.0M and Terms/DueDate le datetime'2024-01-15'",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [invoice::tests::invoice_item("00000042", "C001", 12.5)],
                "NextPageLink": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = invoice_endpoint(&format!("{}/accountright", server.uri()), "cf-1").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut session = session(&server, stored("access-0"));

        let invoices = fetch_overdue(&mut session, &base, &OverdueQuery::new(0.0, 60), today)
            .await
            .unwrap();

        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].number, "00000042");
    }
}

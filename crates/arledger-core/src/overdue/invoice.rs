//! Overdue invoices and the per-customer summary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::crm::CustomerRecord;
use crate::error::{Error, Result};

/// Customer reference embedded in an invoice.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerRef {
    /// Card ID, matching the Syrinx account number.
    #[serde(rename = "DisplayID")]
    pub display_id: String,
    /// Card name.
    pub name: String,
}

/// Sale invoice fields used for logs and alerts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice {
    /// Invoice number.
    pub number: String,
    /// Issue date as sent by the API (`YYYY-MM-DDTHH:MM:SS`).
    pub date: String,
    /// Invoiced customer.
    pub customer: CustomerRef,
    /// Amount still owing.
    pub balance_due_amount: f64,
    /// Amount before tax.
    pub subtotal: f64,
    /// Tax amount.
    pub total_tax: f64,
    /// Amount including tax.
    pub total_amount: f64,
    /// Memo recorded against the sale.
    #[serde(default)]
    pub journal_memo: Option<String>,
}

impl Invoice {
    /// Decodes one item returned by the invoice endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResponse` if a field is missing or mistyped.
    pub fn from_item(item: &Value) -> Result<Self> {
        Self::deserialize(item).map_err(|e| {
            let number = item.get("Number").and_then(Value::as_str).unwrap_or("?");
            Error::InvalidResponse(format!("invoice {number}: {e}"))
        })
    }

    /// Issue date as `dd/mm/yyyy`, or the raw value if it is not ISO 8601.
    #[must_use]
    pub fn display_date(&self) -> String {
        self.date
            .get(..10)
            .and_then(|ymd| NaiveDate::parse_from_str(ymd, "%Y-%m-%d").ok())
            .map_or_else(|| self.date.clone(), |d| d.format("%d/%m/%Y").to_string())
    }
}

/// Decodes every item, failing on the first malformed invoice.
///
/// # Errors
///
/// Returns `Error::InvalidResponse` for the first item that cannot be decoded.
pub fn parse_invoices(items: &[Value]) -> Result<Vec<Invoice>> {
    items.iter().map(Invoice::from_item).collect()
}

/// What one customer owes and how the CRM treats them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomerSummary {
    /// Excluded from debt collecting.
    pub excluded: bool,
    /// Sum of overdue balances.
    pub total_owing: f64,
    /// Manual notes currently in the CRM alert.
    pub alert_text: Option<String>,
}

/// Summary keyed by account number, in account order.
pub type Summary = BTreeMap<String, CustomerSummary>;

/// Totals overdue balances per customer and merges in the flagged CRM rows.
///
/// CRM customers with nothing overdue appear with a zero total so their
/// flags are still logged.
#[must_use]
pub fn summarize(invoices: &[Invoice], flagged: &[CustomerRecord]) -> Summary {
    let mut summary = Summary::new();

    for invoice in invoices {
        summary
            .entry(invoice.customer.display_id.clone())
            .or_default()
            .total_owing += invoice.balance_due_amount;
    }

    for record in flagged {
        let entry = summary.entry(record.account_number.clone()).or_default();
        entry.excluded = record.excluded;
        entry.alert_text.clone_from(&record.alert_text);
    }

    summary
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
    use serde_json::json;

    pub(crate) fn invoice_item(number: &str, customer: &str, balance: f64) -> Value {
        json!({
            "UID": "6f2b9a34-0000-0000-0000-000000000000",
            "Number": number,
            "Date": "2024-01-02T00:00:00",
            "Customer": {"UID": "c", "Name": format!("{customer} Pty Ltd"), "DisplayID": customer},
            "BalanceDueAmount": balance,
            "Subtotal": 100.0,
            "TotalTax": 10.0,
            "TotalAmount": 110.0,
            "JournalMemo": format!("Sale; {customer}"),
            "Terms": {"DueDate": "2024-01-16T00:00:00"}
        })
    }

    #[test]
    fn test_from_item() {
        let invoice = Invoice::from_item(&invoice_item("00000123", "C001", 55.5)).unwrap();
        assert_eq!(invoice.number, "00000123");
        assert_eq!(invoice.customer.display_id, "C001");
        assert_eq!(invoice.customer.name, "C001 Pty Ltd");
        assert_eq!(invoice.journal_memo.as_deref(), Some("Sale; C001"));
        assert_eq!(invoice.display_date(), "02/01/2024");
    }

    #[test]
    fn test_from_item_names_the_bad_invoice() {
        let item = json!({"Number": "00000999", "Date": "2024-01-02T00:00:00"});
        let err = Invoice::from_item(&item).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.starts_with("invoice 00000999")));
    }

    #[test]
    fn test_display_date_falls_back_to_raw() {
        let mut invoice = Invoice::from_item(&invoice_item("1", "C001", 1.0)).unwrap();
        invoice.date = "soon".to_string();
        assert_eq!(invoice.display_date(), "soon");
    }

    #[test]
    fn test_summarize_merges_crm_rows() {
        let invoices = parse_invoices(&[
            invoice_item("1", "C002", 100.25),
            invoice_item("2", "C001", 10.0),
            invoice_item("3", "C002", 0.75),
        ])
        .unwrap();
        let flagged = vec![
            CustomerRecord {
                account_number: "C002".into(),
                alert_text: Some("Call first".into()),
                on_hold: true,
                excluded: true,
            },
            CustomerRecord {
                account_number: "C900".into(),
                alert_text: None,
                on_hold: false,
                excluded: true,
            },
        ];

        let summary = summarize(&invoices, &flagged);
        let keys: Vec<&str> = summary.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C001", "C002", "C900"]);

        assert_eq!(
            summary["C001"],
            CustomerSummary {
                excluded: false,
                total_owing: 10.0,
                alert_text: None
            }
        );
        assert!((summary["C002"].total_owing - 101.0).abs() < 1e-9);
        assert!(summary["C002"].excluded);
        assert_eq!(summary["C002"].alert_text.as_deref(), Some("Call first"));
        assert!(summary["C900"].total_owing.abs() < f64::EPSILON);
    }
}

//! Customer alerts in the Syrinx CRM.
//!
//! Automated text is written in front of an automation marker (`~~`); anything
//! after it is a note typed by staff and survives every rewrite. Planning is
//! pure and storage goes through [`CustomerStore`].

mod sqlserver;

pub use sqlserver::{FLAGGED_CUSTOMERS_SQL, SqlServerStore};

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::overdue::{CustomerSummary, Summary};

/// Separates automated alert text from manual notes.
pub const AUTOMATION_MARKER: &str = "~~";

/// A current customer carrying an alert, a hold or the exclusion flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    /// Syrinx account number (the MYOB card display ID).
    pub account_number: String,
    /// Alert text, automated part included.
    pub alert_text: Option<String>,
    /// Customer is on hold.
    pub on_hold: bool,
    /// Customer is excluded from debt collecting.
    pub excluded: bool,
}

/// One change to a customer's alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertUpdate {
    /// Drop the automated text and the hold left by a previous run.
    Clear {
        /// Customer account number.
        account_number: String,
        /// Manual notes to keep, `None` to null the alert.
        alert_text: Option<String>,
    },
    /// Write a new overdue alert.
    Overdue {
        /// Customer account number.
        account_number: String,
        /// Complete alert text.
        alert_text: String,
        /// Place the customer on hold.
        place_on_hold: bool,
    },
}

impl AlertUpdate {
    /// Account the update applies to.
    #[must_use]
    pub fn account_number(&self) -> &str {
        match self {
            Self::Clear { account_number, .. } | Self::Overdue { account_number, .. } => {
                account_number
            }
        }
    }

    /// Alert text the update writes.
    #[must_use]
    pub fn alert_text(&self) -> Option<&str> {
        match self {
            Self::Clear { alert_text, .. } => alert_text.as_deref(),
            Self::Overdue { alert_text, .. } => Some(alert_text),
        }
    }
}

/// Returns the manual notes that follow the automation marker.
///
/// Text without a marker, or with the marker at the very start, is treated as
/// entirely manual. One space after the marker is a separator and is dropped.
/// Returns `None` when nothing is left.
#[must_use]
pub fn strip_automated_note(alert_text: Option<&str>) -> Option<String> {
    let text = alert_text?;
    let kept = match text.find(AUTOMATION_MARKER) {
        Some(pos) if pos > 0 => {
            let rest = &text[pos + AUTOMATION_MARKER.len()..];
            rest.strip_prefix(' ').unwrap_or(rest)
        }
        _ => text,
    };

    if kept.is_empty() {
        None
    } else {
        Some(kept.to_string())
    }
}

/// Plans the clearing pass: every flagged customer loses its automated
/// text and hold.
#[must_use]
pub fn plan_clear(records: &[CustomerRecord]) -> Vec<AlertUpdate> {
    records
        .iter()
        .map(|record| AlertUpdate::Clear {
            account_number: record.account_number.clone(),
            alert_text: strip_automated_note(record.alert_text.as_deref()),
        })
        .collect()
}

/// Alert text for a customer owing money on invoices over `days_over` days.
#[must_use]
pub fn overdue_alert_text(customer: &CustomerSummary, days_over: u32) -> String {
    let total = format!("{:.2}", customer.total_owing);
    let kept = customer
        .alert_text
        .as_deref()
        .filter(|notes| !notes.is_empty())
        .map(|notes| format!(" {notes}"))
        .unwrap_or_default();

    if customer.excluded {
        format!(
            "OVERDUE ACCOUNT: ${total} is the total of all invoices due over {days_over} days ago. \
             For more info, see MYOB. This customer is excluded from debt collecting. \
             To stop excluding this customer from debt collection and place this customer on hold, \
             go to CRM, tick on hold and remove N from Misc > Hold Overdue. \
             This message and status will disappear when the account is up to date. \
             {AUTOMATION_MARKER}{kept}"
        )
    } else {
        format!(
            "ON HOLD DUE TO OVERDUE ACCOUNT: ${total} to be paid immediately. \
             This balance reflects the total of invoices due over {days_over} days ago. \
             For more info, see MYOB. To bypass this hold, go to CRM and remove the on hold status temporarily. \
             This message and status will disappear when the account is up to date. \
             {AUTOMATION_MARKER}{kept}"
        )
    }
}

/// Plans the overdue pass: every customer with a positive balance gets a new
/// alert, and those not excluded from debt collecting are put on hold.
#[must_use]
pub fn plan_overdue(summary: &Summary, days_over: u32) -> Vec<AlertUpdate> {
    summary
        .iter()
        .filter(|(_, customer)| customer.total_owing > 0.0)
        .map(|(account, customer)| AlertUpdate::Overdue {
            account_number: account.clone(),
            alert_text: overdue_alert_text(customer, days_over),
            place_on_hold: !customer.excluded,
        })
        .collect()
}

/// Storage for customer alerts.
#[async_trait]
pub trait CustomerStore: Send {
    /// Current customers with an alert, a hold or the exclusion flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn flagged_customers(&mut self) -> Result<Vec<CustomerRecord>>;

    /// Applies one update.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn apply(&mut self, update: &AlertUpdate) -> Result<()>;
}

/// Reads from the wrapped store but only logs updates.
#[derive(Debug)]
pub struct DryRunStore<S> {
    inner: S,
}

impl<S> DryRunStore<S> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: CustomerStore> CustomerStore for DryRunStore<S> {
    async fn flagged_customers(&mut self) -> Result<Vec<CustomerRecord>> {
        self.inner.flagged_customers().await
    }

    async fn apply(&mut self, update: &AlertUpdate) -> Result<()> {
        info!(
            account = update.account_number(),
            statement = sqlserver::statement_for(update),
            alert = update.alert_text().unwrap_or("NULL"),
            "Dry run: update not executed"
        );
        Ok(())
    }
}

/// In-memory customer table used by tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryCustomerStore {
    records: Vec<CustomerRecord>,
    applied: Vec<AlertUpdate>,
}

#[cfg(test)]
impl MemoryCustomerStore {
    /// Creates a store holding `records`.
    #[must_use]
    pub const fn with_records(records: Vec<CustomerRecord>) -> Self {
        Self {
            records,
            applied: Vec::new(),
        }
    }

    /// Current records.
    #[must_use]
    pub fn records(&self) -> &[CustomerRecord] {
        &self.records
    }

    /// Updates applied so far, in order.
    #[must_use]
    pub fn applied(&self) -> &[AlertUpdate] {
        &self.applied
    }

    fn record_mut(&mut self, account_number: &str) -> Option<&mut CustomerRecord> {
        self.records
            .iter_mut()
            .find(|r| r.account_number == account_number)
    }
}

#[cfg(test)]
#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn flagged_customers(&mut self) -> Result<Vec<CustomerRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.alert_text.is_some() || r.on_hold || r.excluded)
            .cloned()
            .collect())
    }

    async fn apply(&mut self, update: &AlertUpdate) -> Result<()> {
        if let Some(record) = self.record_mut(update.account_number()) {
            match update {
                AlertUpdate::Clear { alert_text, .. } => {
                    record.alert_text.clone_from(alert_text);
                    record.on_hold = false;
                }
                AlertUpdate::Overdue {
                    alert_text,
                    place_on_hold,
                    ..
                } => {
                    record.alert_text = Some(alert_text.clone());
                    record.on_hold |= *place_on_hold;
                }
            }
        }
        self.applied.push(update.clone());
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
    use proptest::prelude::*;

    fn record(account: &str, alert: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            account_number: account.to_string(),
            alert_text: alert.map(str::to_string),
            on_hold: false,
            excluded: false,
        }
    }

    fn owing(total: f64, excluded: bool, notes: Option<&str>) -> CustomerSummary {
        CustomerSummary {
            excluded,
            total_owing: total,
            alert_text: notes.map(str::to_string),
        }
    }

    #[test]
    fn test_strip_keeps_manual_notes() {
        assert_eq!(
            strip_automated_note(Some("ON HOLD DUE TO OVERDUE ACCOUNT: $10.00 ... ~~ Call Tom first")),
            Some("Call Tom first".to_string())
        );
        assert_eq!(strip_automated_note(Some("OVERDUE ACCOUNT ... ~~")), None);
        assert_eq!(strip_automated_note(None), None);
    }

    #[test]
    fn test_strip_leaves_manual_only_text() {
        assert_eq!(
            strip_automated_note(Some("Cash only")),
            Some("Cash only".to_string())
        );
        assert_eq!(
            strip_automated_note(Some("~~ typed by hand")),
            Some("~~ typed by hand".to_string())
        );
        assert_eq!(strip_automated_note(Some("")), None);
    }

    #[test]
    fn test_plan_clear() {
        let records = vec![
            record("C001", None),
            record("C002", Some("auto ~~ keep me")),
            record("C003", Some("manual")),
        ];
        let updates = plan_clear(&records);
        assert_eq!(
            updates,
            vec![
                AlertUpdate::Clear {
                    account_number: "C001".into(),
                    alert_text: None
                },
                AlertUpdate::Clear {
                    account_number: "C002".into(),
                    alert_text: Some("keep me".into())
                },
                AlertUpdate::Clear {
                    account_number: "C003".into(),
                    alert_text: Some("manual".into())
                },
            ]
        );
    }

    #[test]
    fn test_hold_alert_text() {
        let text = overdue_alert_text(&owing(1234.5, false, Some("Call Tom first")), 60);
        assert_eq!(
            text,
            "ON HOLD DUE TO OVERDUE ACCOUNT: $1234.50 to be paid immediately. \
             This balance reflects the total of invoices due over 60 days ago. \
             For more info, see MYOB. To bypass this hold, go to CRM and remove the on hold status temporarily. \
             This message and status will disappear when the account is up to date. ~~ Call Tom first"
        );
    }

    #[test]
    fn test_excluded_alert_text() {
        let text = overdue_alert_text(&owing(99.999, true, None), 30);
        assert!(text.starts_with("OVERDUE ACCOUNT: $100.00 is the total of all invoices due over 30 days ago."));
        assert!(text.contains("remove N from Misc > Hold Overdue."));
        assert!(text.ends_with("up to date. ~~"));
    }

    #[test]
    fn test_plan_overdue_skips_settled_customers() {
        let mut summary = Summary::new();
        summary.insert("C001".into(), owing(50.0, false, None));
        summary.insert("C002".into(), owing(0.0, false, Some("manual")));
        summary.insert("C003".into(), owing(12.0, true, Some("note")));

        let updates = plan_overdue(&summary, 60);
        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[0],
            AlertUpdate::Overdue { account_number, place_on_hold: true, .. } if account_number == "C001"
        ));
        assert!(matches!(
            &updates[1],
            AlertUpdate::Overdue { account_number, place_on_hold: false, alert_text } if account_number == "C003" && alert_text.ends_with("~~ note")
        ));
    }

    #[tokio::test]
    async fn test_memory_store_applies_updates() {
        let mut store = MemoryCustomerStore::with_records(vec![
            CustomerRecord {
                on_hold: true,
                ..record("C001", Some("auto ~~ keep"))
            },
            record("C002", None),
        ]);

        let flagged = store.flagged_customers().await.unwrap();
        assert_eq!(flagged.len(), 1);

        for update in plan_clear(&flagged) {
            store.apply(&update).await.unwrap();
        }
        assert_eq!(store.records()[0].alert_text.as_deref(), Some("keep"));
        assert!(!store.records()[0].on_hold);
    }

    #[tokio::test]
    async fn test_dry_run_reads_but_does_not_write() {
        let mut store = DryRunStore::new(MemoryCustomerStore::with_records(vec![record(
            "C001",
            Some("auto ~~ keep"),
        )]));

        let flagged = store.flagged_customers().await.unwrap();
        for update in plan_clear(&flagged) {
            store.apply(&update).await.unwrap();
        }

        assert!(store.inner.applied().is_empty());
        assert_eq!(
            store.inner.records()[0].alert_text.as_deref(),
            Some("auto ~~ keep")
        );
    }

    proptest! {
        #[test]
        fn generated_alert_round_trips_manual_notes(
            notes in "[A-Za-z0-9 .,]{0,40}",
            total in 0.01f64..100_000.0,
            excluded in any::<bool>(),
        ) {
            let notes = notes.trim().to_string();
            let notes = (!notes.is_empty()).then_some(notes);
            let text = overdue_alert_text(&owing(total, excluded, notes.as_deref()), 60);
            prop_assert_eq!(strip_automated_note(Some(&text)), notes);
        }
    }
}

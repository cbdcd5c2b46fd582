//! The overdue run: clear old alerts, fetch overdue invoices, write the logs
//! and set new alerts.

use std::path::PathBuf;

use arledger_oauth::TokenStore;
use chrono::NaiveDateTime;
use tracing::info;
use url::Url;

use crate::api::ApiSession;
use crate::config::Settings;
use crate::crm::{AlertUpdate, CustomerStore, plan_clear, plan_overdue};
use crate::error::Result;
use crate::overdue::{OverdueQuery, fetch_overdue, invoice_endpoint, summarize};
use crate::report::{ReportFiles, write_detailed_file, write_summary_file, write_workbook};

/// Counts and files produced by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Customers whose automated alerts were cleared.
    pub cleared: usize,
    /// Overdue invoices retrieved.
    pub invoices: usize,
    /// Customers in the summary.
    pub customers: usize,
    /// Overdue alerts written.
    pub alerts: usize,
    /// Log files written.
    pub files: ReportFiles,
}

/// One pass of the overdue workflow.
#[derive(Debug, Clone)]
pub struct OverdueRun {
    invoice_base: Url,
    query: OverdueQuery,
    folder: PathBuf,
    started: NaiveDateTime,
}

impl OverdueRun {
    /// Creates a run.
    #[must_use]
    pub const fn new(
        invoice_base: Url,
        query: OverdueQuery,
        folder: PathBuf,
        started: NaiveDateTime,
    ) -> Self {
        Self {
            invoice_base,
            query,
            folder,
            started,
        }
    }

    /// Creates a run from the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL is invalid.
    pub fn from_settings(settings: &Settings, started: NaiveDateTime) -> Result<Self> {
        let invoice_base =
            invoice_endpoint(&settings.myob.api_base_url, &settings.myob.company_file_id)?;
        Ok(Self::new(
            invoice_base,
            OverdueQuery::new(settings.general.min_total, settings.general.days_over),
            settings.general.folder_location.clone(),
            started,
        ))
    }

    /// Query used by this run.
    #[must_use]
    pub const fn query(&self) -> &OverdueQuery {
        &self.query
    }

    /// Removes automated alert text and holds left by earlier runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the customers cannot be read or updated.
    pub async fn clear_alerts<C: CustomerStore>(&self, customers: &mut C) -> Result<usize> {
        let flagged = customers.flagged_customers().await?;
        let updates = plan_clear(&flagged);
        apply_all(customers, &updates).await?;
        info!(count = updates.len(), "Outdated overdue alerts cleared");
        Ok(updates.len())
    }

    /// Runs the whole workflow.
    ///
    /// Alerts are only written after every log file has been saved, so a
    /// failed fetch leaves the CRM cleared but never half-updated.
    ///
    /// # Errors
    ///
    /// Returns the first error from the CRM, the API or the file system.
    pub async fn run<S, C>(
        &self,
        session: &mut ApiSession<S>,
        customers: &mut C,
    ) -> Result<RunReport>
    where
        S: TokenStore,
        C: CustomerStore,
    {
        let cleared = self.clear_alerts(customers).await?;

        let today = self.started.date();
        let invoices = fetch_overdue(session, &self.invoice_base, &self.query, today).await?;
        let flagged = customers.flagged_customers().await?;
        let summary = summarize(&invoices, &flagged);

        std::fs::create_dir_all(&self.folder)?;
        let files = ReportFiles::new(&self.folder, self.started);
        write_detailed_file(&files.detailed, &invoices)?;
        write_summary_file(&files.summary, &summary)?;
        write_workbook(&files.workbook, &summary, &invoices, today)?;
        info!("Logs written to {}", self.folder.display());

        let updates = plan_overdue(&summary, self.query.days_over);
        apply_all(customers, &updates).await?;
        info!(count = updates.len(), "Overdue alerts set");

        Ok(RunReport {
            cleared,
            invoices: invoices.len(),
            customers: summary.len(),
            alerts: updates.len(),
            files,
        })
    }
}

async fn apply_all<C: CustomerStore>(customers: &mut C, updates: &[AlertUpdate]) -> Result<()> {
    for update in updates {
        customers.apply(update).await?;
    }
    Ok(())
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
    use crate::api::tests::{session, stored};
    use crate::crm::{CustomerRecord, MemoryCustomerStore};
    use crate::error::Error;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoice(number: &str, customer: &str, balance: f64) -> serde_json::Value {
        json!({
            "Number": number,
            "Date": "2024-01-02T00:00:00",
            "Customer": {"Name": format!("{customer} Pty Ltd"), "DisplayID": customer},
            "BalanceDueAmount": balance,
            "Subtotal": balance,
            "TotalTax": 0.0,
            "TotalAmount": balance,
            "JournalMemo": null
        })
    }

    fn customers() -> MemoryCustomerStore {
        MemoryCustomerStore::with_records(vec![
            CustomerRecord {
                account_number: "C001".into(),
                alert_text: Some("ON HOLD DUE TO OVERDUE ACCOUNT: $1.00 ... ~~ Ring before delivery".into()),
                on_hold: true,
                excluded: false,
            },
            CustomerRecord {
                account_number: "C002".into(),
                alert_text: None,
                on_hold: false,
                excluded: true,
            },
            CustomerRecord {
                account_number: "C003".into(),
                alert_text: Some("OVERDUE ACCOUNT: ... ~~".into()),
                on_hold: false,
                excluded: false,
            },
        ])
    }

    fn run_in(server: &MockServer, folder: PathBuf) -> OverdueRun {
        let started = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        OverdueRun::new(
            invoice_endpoint(&format!("{}/accountright", server.uri()), "cf-1").unwrap(),
            OverdueQuery::new(0.0, 60),
            folder,
            started,
        )
    }

    #[tokio::test]
    async fn test_run_updates_crm_and_writes_logs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountright/cf-1/Sale/Invoice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [
                    invoice("00000001", "C001", 100.0),
                    invoice("00000002", "C002", 20.5),
                    invoice("00000003", "C001", 0.5)
                ],
                "NextPageLink": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let run = run_in(&server, dir.path().join("logs"));
        let mut session = session(&server, stored("access-0"));
        let mut crm = customers();

        let report = run.run(&mut session, &mut crm).await.unwrap();

        assert_eq!(report.cleared, 3);
        assert_eq!(report.invoices, 3);
        assert_eq!(report.customers, 2);
        assert_eq!(report.alerts, 2);
        assert!(report.files.detailed.exists());
        assert!(report.files.summary.exists());
        assert!(report.files.workbook.exists());

        let records = crm.records();
        let c001 = records[0].alert_text.as_deref().unwrap();
        assert!(c001.starts_with("ON HOLD DUE TO OVERDUE ACCOUNT: $100.50 to be paid immediately."));
        assert!(c001.ends_with("~~ Ring before delivery"));
        assert!(records[0].on_hold);

        let c002 = records[1].alert_text.as_deref().unwrap();
        assert!(c002.starts_with("OVERDUE ACCOUNT: $20.50"));
        assert!(!records[1].on_hold);

        assert_eq!(records[2].alert_text, None);
        assert!(!records[2].on_hold);

        let summary_log = std::fs::read_to_string(&report.files.summary).unwrap();
        assert!(summary_log.contains("C001\t0\t100.5\tRing before delivery\r\n"));
        assert!(summary_log.contains("C002\t1\t20.5\t\r\n"));
        assert!(!summary_log.contains("C003"));
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_no_alerts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let run = run_in(&server, dir.path().to_path_buf());
        let mut session = session(&server, stored("access-0"));
        let mut crm = customers();

        let err = run.run(&mut session, &mut crm).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));

        assert_eq!(crm.applied().len(), 3);
        assert!(
            crm.applied()
                .iter()
                .all(|u| matches!(u, AlertUpdate::Clear { .. }))
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_toml(crate::config::tests::FULL_SETTINGS).unwrap();
        let started = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let run = OverdueRun::from_settings(&settings, started).unwrap();

        assert_eq!(
            run.invoice_base.as_str(),
            "https://ar2.api.myob.com/accountright/0f1e2d3c/Sale/Invoice"
        );
        assert_eq!(run.query().days_over, 45);
    }
}

//! Syrinx customer table on SQL Server.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::{AlertUpdate, CustomerRecord, CustomerStore};
use crate::config::SqlSettings;
use crate::error::{Error, Result};

/// Current customers carrying an alert, a hold or the exclusion flag.
pub const FLAGGED_CUSTOMERS_SQL: &str = "SELECT \
     CST_ACCOUNT_NUMBER, \
     CST_ALERT_TEXT, \
     CASE WHEN CST_ON_HOLD = 1 THEN 1 ELSE 0 END AS CST_ON_HOLD, \
     CASE WHEN CST_PROP2 IS NULL THEN 0 ELSE 1 END AS CST_PROP2 \
     FROM dbo.TH_CUSTOMERS \
     WHERE CST_CURRENT_FLAG = 1 \
     AND CST_ACCOUNT_NUMBER IS NOT NULL \
     AND (CST_ALERT_TEXT IS NOT NULL \
     OR CST_PROP2 IS NOT NULL \
     OR CST_ON_HOLD = 1)";

const CLEAR_SQL: &str = "UPDATE dbo.TH_CUSTOMERS SET \
     CST_ALERT_CHG_DATE = NULL, \
     CST_ALERT_CHG_USERID = NULL, \
     CST_ALERT_TEXT = @P1, \
     CST_ON_HOLD = 0 \
     WHERE CST_ACCOUNT_NUMBER = @P2";

const OVERDUE_SQL: &str = "UPDATE dbo.TH_CUSTOMERS SET \
     CST_ALERT_CHG_DATE = GETDATE(), \
     CST_ALERT_CHG_USERID = @P1, \
     CST_ALERT_TEXT = @P2 \
     WHERE CST_ACCOUNT_NUMBER = @P3";

const HOLD_SQL: &str = "UPDATE dbo.TH_CUSTOMERS SET \
     CST_ON_HOLD = 1, \
     CST_ALERT_CHG_DATE = GETDATE(), \
     CST_ALERT_CHG_USERID = @P1, \
     CST_ALERT_TEXT = @P2 \
     WHERE CST_ACCOUNT_NUMBER = @P3";

/// Parameterized statement that applies `update`.
pub(super) const fn statement_for(update: &AlertUpdate) -> &'static str {
    match update {
        AlertUpdate::Clear { .. } => CLEAR_SQL,
        AlertUpdate::Overdue {
            place_on_hold: true,
            ..
        } => HOLD_SQL,
        AlertUpdate::Overdue { .. } => OVERDUE_SQL,
    }
}

/// Customer store backed by the Syrinx database.
pub struct SqlServerStore {
    client: Client<Compat<TcpStream>>,
    alert_user_id: i32,
}

impl SqlServerStore {
    /// Connects with SQL Server authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the login.
    pub async fn connect(settings: &SqlSettings) -> Result<Self> {
        let mut config = Config::new();
        config.host(&settings.server);
        config.port(settings.port);
        config.database(&settings.db);
        config.authentication(AuthMethod::sql_server(&settings.uid, &settings.pwd));
        if settings.trust_cert {
            config.trust_cert();
        }

        debug!("Connecting to {}:{}/{}", settings.server, settings.port, settings.db);
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(config, tcp.compat_write()).await?;
        info!("Connected to {}", settings.db);

        Ok(Self {
            client,
            alert_user_id: settings.alert_user_id,
        })
    }
}

fn customer_from_row(row: &Row) -> Result<CustomerRecord> {
    let account_number: &str = row
        .try_get(0)?
        .ok_or_else(|| Error::InvalidResponse("customer without account number".into()))?;
    let alert_text: Option<&str> = row.try_get(1)?;
    let on_hold: Option<i32> = row.try_get(2)?;
    let excluded: Option<i32> = row.try_get(3)?;

    Ok(CustomerRecord {
        account_number: account_number.to_string(),
        alert_text: alert_text.map(str::to_string),
        on_hold: on_hold == Some(1),
        excluded: excluded == Some(1),
    })
}

#[async_trait]
impl CustomerStore for SqlServerStore {
    async fn flagged_customers(&mut self) -> Result<Vec<CustomerRecord>> {
        let rows = self
            .client
            .simple_query(FLAGGED_CUSTOMERS_SQL)
            .await?
            .into_first_result()
            .await?;

        let records = rows
            .iter()
            .map(customer_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = records.len(), "Flagged customers loaded");
        Ok(records)
    }

    async fn apply(&mut self, update: &AlertUpdate) -> Result<()> {
        let statement = statement_for(update);
        let result = match update {
            AlertUpdate::Clear {
                account_number,
                alert_text,
            } => {
                self.client
                    .execute(statement, &[&alert_text.as_deref(), &account_number.as_str()])
                    .await?
            }
            AlertUpdate::Overdue {
                account_number,
                alert_text,
                ..
            } => {
                self.client
                    .execute(
                        statement,
                        &[&self.alert_user_id, &alert_text.as_str(), &account_number.as_str()],
                    )
                    .await?
            }
        };

        debug!(
            account = update.account_number(),
            rows = result.total(),
            "Alert updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_selection() {
        let clear = AlertUpdate::Clear {
            account_number: "C001".into(),
            alert_text: None,
        };
        let hold = AlertUpdate::Overdue {
            account_number: "C001".into(),
            alert_text: "text".into(),
            place_on_hold: true,
        };
        let excluded = AlertUpdate::Overdue {
            account_number: "C001".into(),
            alert_text: "text".into(),
            place_on_hold: false,
        };

        assert!(statement_for(&clear).contains("CST_ON_HOLD = 0"));
        assert!(statement_for(&hold).contains("CST_ON_HOLD = 1"));
        assert!(!statement_for(&excluded).contains("CST_ON_HOLD"));
    }

    #[test]
    fn test_statements_are_parameterized() {
        for sql in [CLEAR_SQL, OVERDUE_SQL, HOLD_SQL] {
            assert!(!sql.contains('\''), "{sql}");
            assert!(sql.ends_with("WHERE CST_ACCOUNT_NUMBER = @P2") || sql.ends_with("@P3"));
        }
    }

    #[test]
    fn test_flagged_query_shape() {
        assert!(FLAGGED_CUSTOMERS_SQL.contains("FROM dbo.TH_CUSTOMERS WHERE CST_CURRENT_FLAG = 1"));
        assert!(FLAGGED_CUSTOMERS_SQL.contains("CASE WHEN CST_PROP2 IS NULL THEN 0 ELSE 1 END AS CST_PROP2"));
    }
}

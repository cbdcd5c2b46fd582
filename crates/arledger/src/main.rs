//! `arledger` - overdue-invoice alerts for Syrinx from MYOB `AccountRight`.
//!
//! Pulls overdue invoices through the MYOB API, rewrites the matching
//! customer alerts in the Syrinx CRM, writes the run logs and emails the
//! Excel log once a week.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod args;

use std::process::ExitCode;

use anyhow::Context;
use arledger_core::crm::SqlServerStore;
use arledger_core::overdue::{build_overdue_url, invoice_endpoint};
use arledger_core::{
    ApiSession, DryRunStore, Error, OverdueRun, PendingRequest, Settings, send_if_due,
};
use arledger_oauth::FileTokenStore;
use arledger_oauth::token::mask_token;
use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use args::{Cli, Command, Resource};

/// Exit status when the redirect failed the anti-forgery check.
const SECURITY_VIOLATION_EXIT: u8 = 2;

type Session = ApiSession<FileTokenStore>;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "arledger={default_level},arledger_core={default_level},arledger_oauth={default_level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn is_security_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<Error>()
            .is_some_and(Error::is_security_violation)
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_security_violation(&err) => {
            error!("Authorization aborted: {err:#}");
            ExitCode::from(SECURITY_VIOLATION_EXIT)
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = Settings::locate(cli.config.as_deref());
    info!("Using settings from {}", path.display());
    let settings =
        Settings::load(&path).with_context(|| format!("loading {}", path.display()))?;
    let mut session = ApiSession::from_settings(&settings.myob, FileTokenStore::new(&path))
        .context("creating the MYOB session")?;

    match cli.command {
        Command::Run => run_overdue(&settings, &mut session, cli.dry_run).await,
        Command::Authorize => {
            let tokens = session.authorize().await?;
            info!(
                access = %mask_token(&tokens.access_token),
                "Authorization complete, tokens saved"
            );
            Ok(())
        }
        Command::Refresh => {
            let tokens = session.refresh().await?;
            info!(
                access = %mask_token(&tokens.access_token),
                "Tokens refreshed and saved"
            );
            Ok(())
        }
        Command::Tokens => {
            let tokens = session.tokens().context("no tokens stored, run `arledger authorize`")?;
            println!("Access:  {}", mask_token(&tokens.access_token));
            println!("Refresh: {}", mask_token(&tokens.refresh_token));
            Ok(())
        }
        Command::Fetch { resource } => fetch(&settings, &mut session, resource).await,
    }
}

async fn run_overdue(settings: &Settings, session: &mut Session, dry_run: bool) -> anyhow::Result<()> {
    let started = Local::now().naive_local();
    let overdue = OverdueRun::from_settings(settings, started)?;

    let sql = settings.sql()?;
    let store = SqlServerStore::connect(sql)
        .await
        .with_context(|| format!("connecting to {}/{}", sql.server, sql.db))?;

    let report = if dry_run {
        warn!("Dry run: CRM will not be updated and no email will be sent");
        overdue.run(session, &mut DryRunStore::new(store)).await?
    } else {
        let mut store = store;
        overdue.run(session, &mut store).await?
    };

    info!(
        cleared = report.cleared,
        invoices = report.invoices,
        customers = report.customers,
        alerts = report.alerts,
        "Overdue run complete"
    );

    if dry_run {
        return Ok(());
    }
    match &settings.email {
        Some(email) => {
            send_if_due(email, &report.files.workbook, started.date())
                .await
                .context("emailing the overdue log")?;
        }
        None => info!("No [EMAIL] section, log not emailed"),
    }
    Ok(())
}

async fn fetch(settings: &Settings, session: &mut Session, resource: Resource) -> anyhow::Result<()> {
    let url = match resource {
        Resource::CompanyFiles => {
            Url::parse(&settings.myob.company_files_url).context("invalid company_files_url")?
        }
        Resource::Overdue => {
            let base =
                invoice_endpoint(&settings.myob.api_base_url, &settings.myob.company_file_id)?;
            build_overdue_url(&base, settings.general.min_total, settings.general.days_over)?
        }
    };

    let items = session.execute(&PendingRequest::get(url)).await?;
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mismatch_maps_to_security_exit() {
        let mismatch = arledger_oauth::Error::StateMismatch {
            expected: "abc".into(),
            received: "xyz".into(),
        };
        let err = anyhow::Error::from(Error::OAuth(mismatch)).context("authorizing");
        assert!(is_security_violation(&err));

        let other = anyhow::Error::from(Error::RetryBudgetExhausted(20));
        assert!(!is_security_violation(&other));
    }
}

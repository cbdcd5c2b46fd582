//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "arledger")]
#[command(about = "Overdue-invoice alerts for Syrinx from MYOB AccountRight")]
#[command(version)]
pub struct Cli {
    /// Path to settings.toml (defaults to the file beside the executable)
    #[arg(long, short, global = true, env = "ARLEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log CRM updates instead of executing them and never send email
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clear old alerts, fetch overdue invoices, write logs, set alerts and
    /// email the log on the send day
    Run,

    /// Run the browser consent step and store a new token pair
    Authorize,

    /// Exchange the stored refresh token for a new pair
    Refresh,

    /// Show the stored tokens (masked)
    Tokens,

    /// Fetch a resource and print it as JSON
    Fetch {
        #[arg(value_enum)]
        resource: Resource,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    /// Company files visible to the API key
    CompanyFiles,
    /// Overdue invoices for the configured company file
    Overdue,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::try_parse_from(["arledger", "run", "--dry-run", "-c", "/tmp/s.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Run));
        assert!(cli.dry_run);
        assert!(!cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
    }

    #[test]
    fn test_parse_fetch_resource() {
        let cli = Cli::try_parse_from(["arledger", "fetch", "company-files"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Fetch {
                resource: Resource::CompanyFiles
            }
        ));

        assert!(Cli::try_parse_from(["arledger", "fetch", "contacts"]).is_err());
        assert!(Cli::try_parse_from(["arledger"]).is_err());
    }
}

//! Settings file.
//!
//! One TOML file holds everything the tool needs: the MYOB application
//! credentials, the Syrinx connection, mail delivery, and the current tokens
//! (the `[TOKENS]` section, owned by [`arledger_oauth::FileTokenStore`]).

mod validation;

pub use validation::{ValidationError, ValidationResult, validate_settings};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// File name looked up next to the executable and in the config directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Complete settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Run parameters and log location.
    #[serde(rename = "DEFAULT")]
    pub general: GeneralSettings,
    /// MYOB application registration.
    #[serde(rename = "MYOB")]
    pub myob: MyobSettings,
    /// Syrinx database connection.
    #[serde(rename = "SQL", default)]
    pub sql: Option<SqlSettings>,
    /// Weekly log email.
    #[serde(rename = "EMAIL", default)]
    pub email: Option<EmailSettings>,
}

/// Run parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralSettings {
    /// Directory receiving the logs and workbook.
    pub folder_location: PathBuf,
    /// Invoices due more than this many days ago are overdue.
    #[serde(default = "default_days_over")]
    pub days_over: u32,
    /// Only invoices with a balance above this amount are fetched.
    #[serde(default)]
    pub min_total: f64,
}

/// MYOB application registration and API endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MyobSettings {
    /// API key issued to the application.
    pub client_id: String,
    /// API secret issued to the application.
    pub client_secret: String,
    /// Redirect URI registered for the application.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Company file GUID.
    pub company_file_id: String,
    /// Value of the `x-myobapi-version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Company file listing endpoint.
    #[serde(default = "default_company_files_url")]
    pub company_files_url: String,
    /// Base URL that company file paths are appended to.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bound on the interactive consent step.
    #[serde(default = "default_authorization_timeout")]
    pub authorization_timeout_secs: u64,
}

impl MyobSettings {
    /// Per-request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Interactive wait as a duration.
    #[must_use]
    pub const fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }
}

/// Syrinx (SQL Server) connection.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlSettings {
    /// Server host name.
    pub server: String,
    /// Server port.
    #[serde(default = "default_sql_port")]
    pub port: u16,
    /// Database name.
    pub db: String,
    /// Login name.
    pub uid: String,
    /// Login password.
    pub pwd: String,
    /// Accept the server certificate without validation.
    #[serde(default = "default_true")]
    pub trust_cert: bool,
    /// Syrinx user recorded as the author of automated alerts.
    #[serde(default = "default_alert_user_id")]
    pub alert_user_id: i32,
}

/// Mail delivery for the weekly log.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    /// SMTP relay host.
    pub server: String,
    /// SMTP port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Sender address, also the SMTP login.
    pub login_id: String,
    /// SMTP password.
    pub login_pw: String,
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body. Literal `\n` sequences become line breaks.
    #[serde(default)]
    pub body: String,
    /// Weekday the log is sent on (e.g. `Monday`).
    pub send_on_day: String,
}

const fn default_days_over() -> u32 {
    60
}

fn default_redirect_uri() -> String {
    "http://desktop".to_string()
}

fn default_api_version() -> String {
    "v2".to_string()
}

fn default_company_files_url() -> String {
    "https://api.myob.com/accountright".to_string()
}

fn default_api_base_url() -> String {
    "https://ar2.api.myob.com/accountright/".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_authorization_timeout() -> u64 {
    500
}

const fn default_sql_port() -> u16 {
    1433
}

const fn default_true() -> bool {
    true
}

const fn default_alert_user_id() -> i32 {
    16
}

const fn default_smtp_port() -> u16 {
    587
}

impl Settings {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or required keys are
    /// missing.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads and validates the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml(&contents)?;

        validate_settings(&settings).map_err(|errors| {
            let problems: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", e.field(), e.message()))
                .collect();
            Error::Config(problems.join("; "))
        })?;

        Ok(settings)
    }

    /// Finds the settings file: an explicit path wins, then the executable's
    /// directory, then the user config directory.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(SETTINGS_FILE)));
        if let Some(path) = beside_exe.filter(|p| p.exists()) {
            return path;
        }

        dirs::config_dir().map_or_else(
            || PathBuf::from(SETTINGS_FILE),
            |dir| dir.join("arledger").join(SETTINGS_FILE),
        )
    }

    /// SQL section, required for commands touching Syrinx.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the section is absent.
    pub fn sql(&self) -> Result<&SqlSettings> {
        self.sql
            .as_ref()
            .ok_or_else(|| Error::Config("[SQL] section is missing".into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FULL_SETTINGS: &str = r#"
[DEFAULT]
folder_location = "/var/log/arledger"
days_over = 45
min_total = 10.5

[MYOB]
client_id = "key"
client_secret = "secret"
company_file_id = "0f1e2d3c"

[SQL]
server = "syrinx.local"
db = "SyrinxEH"
uid = "ar"
pwd = "pw"

[EMAIL]
server = "smtp.example.com"
login_id = "ar@example.com"
login_pw = "pw"
recipients = ["accounts@example.com", "boss@example.com"]
subject = "Overdue log"
body = "Hi,\\nThe log is attached."
send_on_day = "Monday"

[TOKENS]
Access = "a"
Refresh = "r"
"#;

    #[test]
    fn test_parse_full_settings() {
        let settings = Settings::from_toml(FULL_SETTINGS).unwrap();
        assert_eq!(settings.general.days_over, 45);
        assert!((settings.general.min_total - 10.5).abs() < f64::EPSILON);
        assert_eq!(settings.myob.redirect_uri, "http://desktop");
        assert_eq!(settings.myob.api_version, "v2");
        assert_eq!(settings.myob.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.myob.authorization_timeout(), Duration::from_secs(500));

        let sql = settings.sql().unwrap();
        assert_eq!(sql.port, 1433);
        assert_eq!(sql.alert_user_id, 16);
        assert!(sql.trust_cert);

        let email = settings.email.as_ref().unwrap();
        assert_eq!(email.port, 587);
        assert_eq!(email.recipients.len(), 2);
    }

    #[test]
    fn test_optional_sections() {
        let settings = Settings::from_toml(
            r#"
[DEFAULT]
folder_location = "logs"

[MYOB]
client_id = "key"
client_secret = "secret"
company_file_id = "cf"
"#,
        )
        .unwrap();
        assert_eq!(settings.general.days_over, 60);
        assert!(settings.email.is_none());
        assert!(matches!(settings.sql(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_reports_validation_problems() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"
[DEFAULT]
folder_location = "logs"

[MYOB]
client_id = ""
client_secret = "secret"
company_file_id = "cf"
"#,
        )
        .unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("client_id")));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let path = Path::new("/etc/arledger/custom.toml");
        assert_eq!(Settings::locate(Some(path)), path);
    }
}

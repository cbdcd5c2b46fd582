//! Settings validation.

use chrono::Weekday;

use super::{EmailSettings, Settings, SqlSettings};

/// Validation error for the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Log folder is empty.
    EmptyFolderLocation,
    /// Minimum balance is negative or not a number.
    InvalidMinTotal,
    /// MYOB API key is empty.
    EmptyClientId,
    /// MYOB API secret is empty.
    EmptyClientSecret,
    /// Redirect URI is not an absolute URL.
    InvalidRedirectUri,
    /// Company file GUID is empty.
    EmptyCompanyFileId,
    /// A timeout is zero.
    InvalidTimeout,
    /// SQL server is empty.
    EmptySqlServer,
    /// SQL port is invalid.
    InvalidSqlPort,
    /// SQL database is empty.
    EmptyDatabase,
    /// SQL login is empty.
    EmptySqlUser,
    /// SMTP server is empty.
    EmptySmtpHost,
    /// SMTP port is invalid.
    InvalidSmtpPort,
    /// Sender address format is invalid.
    InvalidSender,
    /// No recipients configured.
    NoRecipients,
    /// A recipient address format is invalid.
    InvalidRecipient,
    /// Send day is not a weekday name.
    InvalidSendDay,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyFolderLocation => "Log folder is required",
            Self::InvalidMinTotal => "Minimum total must be zero or more",
            Self::EmptyClientId => "MYOB API key is required",
            Self::EmptyClientSecret => "MYOB API secret is required",
            Self::InvalidRedirectUri => "Redirect URI must be an absolute URL",
            Self::EmptyCompanyFileId => "Company file ID is required",
            Self::InvalidTimeout => "Timeouts must be at least one second",
            Self::EmptySqlServer => "SQL server is required",
            Self::InvalidSqlPort => "SQL port must be 1-65535",
            Self::EmptyDatabase => "SQL database is required",
            Self::EmptySqlUser => "SQL login is required",
            Self::EmptySmtpHost => "SMTP server is required",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535",
            Self::InvalidSender => "Invalid sender address format",
            Self::NoRecipients => "At least one recipient is required",
            Self::InvalidRecipient => "Invalid recipient address format",
            Self::InvalidSendDay => "Send day must be a weekday name",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyFolderLocation => "DEFAULT.folder_location",
            Self::InvalidMinTotal => "DEFAULT.min_total",
            Self::EmptyClientId => "MYOB.client_id",
            Self::EmptyClientSecret => "MYOB.client_secret",
            Self::InvalidRedirectUri => "MYOB.redirect_uri",
            Self::EmptyCompanyFileId => "MYOB.company_file_id",
            Self::InvalidTimeout => "MYOB.request_timeout_secs",
            Self::EmptySqlServer => "SQL.server",
            Self::InvalidSqlPort => "SQL.port",
            Self::EmptyDatabase => "SQL.db",
            Self::EmptySqlUser => "SQL.uid",
            Self::EmptySmtpHost => "EMAIL.server",
            Self::InvalidSmtpPort => "EMAIL.port",
            Self::InvalidSender => "EMAIL.login_id",
            Self::NoRecipients | Self::InvalidRecipient => "EMAIL.recipients",
            Self::InvalidSendDay => "EMAIL.send_on_day",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating the settings.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate the settings file.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
/// Optional sections are only checked when present.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_settings(settings: &Settings) -> ValidationResult {
    let mut errors = Vec::new();

    if settings.general.folder_location.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyFolderLocation);
    }
    let min_total = settings.general.min_total;
    if !min_total.is_finite() || min_total < 0.0 {
        errors.push(ValidationError::InvalidMinTotal);
    }

    let myob = &settings.myob;
    if myob.client_id.trim().is_empty() {
        errors.push(ValidationError::EmptyClientId);
    }
    if myob.client_secret.is_empty() {
        errors.push(ValidationError::EmptyClientSecret);
    }
    if url::Url::parse(&myob.redirect_uri).is_err() {
        errors.push(ValidationError::InvalidRedirectUri);
    }
    if myob.company_file_id.trim().is_empty() {
        errors.push(ValidationError::EmptyCompanyFileId);
    }
    if myob.request_timeout_secs == 0 || myob.authorization_timeout_secs == 0 {
        errors.push(ValidationError::InvalidTimeout);
    }

    if let Some(sql) = &settings.sql {
        validate_sql(sql, &mut errors);
    }
    if let Some(email) = &settings.email {
        validate_email(email, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_sql(sql: &SqlSettings, errors: &mut Vec<ValidationError>) {
    if sql.server.trim().is_empty() {
        errors.push(ValidationError::EmptySqlServer);
    }
    if sql.port == 0 {
        errors.push(ValidationError::InvalidSqlPort);
    }
    if sql.db.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabase);
    }
    if sql.uid.trim().is_empty() {
        errors.push(ValidationError::EmptySqlUser);
    }
}

fn validate_email(email: &EmailSettings, errors: &mut Vec<ValidationError>) {
    if email.server.trim().is_empty() {
        errors.push(ValidationError::EmptySmtpHost);
    }
    if email.port == 0 {
        errors.push(ValidationError::InvalidSmtpPort);
    }
    if !is_valid_email(&email.login_id) {
        errors.push(ValidationError::InvalidSender);
    }
    if email.recipients.is_empty() {
        errors.push(ValidationError::NoRecipients);
    } else if !email.recipients.iter().all(|r| is_valid_email(r)) {
        errors.push(ValidationError::InvalidRecipient);
    }
    if email.send_on_day.trim().parse::<Weekday>().is_err() {
        errors.push(ValidationError::InvalidSendDay);
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|p| !p.is_empty())
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
    use crate::config::tests::FULL_SETTINGS;

    fn settings() -> Settings {
        Settings::from_toml(FULL_SETTINGS).unwrap()
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("accounts@sub.example.com.au"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example..com"));
    }

    #[test]
    fn test_validate_complete_settings() {
        assert!(validate_settings(&settings()).is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut settings = settings();
        settings.myob.client_id = "  ".to_string();
        settings.myob.company_file_id = String::new();
        settings.general.min_total = -1.0;

        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidMinTotal,
                ValidationError::EmptyClientId,
                ValidationError::EmptyCompanyFileId,
            ]
        );
    }

    #[test]
    fn test_validate_rejects_nan_min_total() {
        let mut settings = settings();
        settings.general.min_total = f64::NAN;
        let errors = validate_settings(&settings).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidMinTotal));
    }

    #[test]
    fn test_validate_email_section() {
        let mut settings = settings();
        let email = settings.email.as_mut().unwrap();
        email.send_on_day = "Someday".to_string();
        email.recipients = vec!["accounts@example.com".into(), "nobody".into()];

        let errors = validate_settings(&settings).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidSendDay));
        assert!(errors.contains(&ValidationError::InvalidRecipient));
        assert_eq!(ValidationError::InvalidSendDay.field(), "EMAIL.send_on_day");
    }

    #[test]
    fn test_validate_sql_section() {
        let mut settings = settings();
        let sql = settings.sql.as_mut().unwrap();
        sql.server = String::new();
        sql.port = 0;

        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::EmptySqlServer, ValidationError::InvalidSqlPort]
        );
    }
}

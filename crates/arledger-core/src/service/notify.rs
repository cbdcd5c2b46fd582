//! Emailing the Excel log.

use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::EmailSettings;
use crate::error::{Error, Result};

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// True when `today` is the configured send day.
#[must_use]
pub fn is_send_day(settings: &EmailSettings, today: Weekday) -> bool {
    settings
        .send_on_day
        .trim()
        .parse::<Weekday>()
        .is_ok_and(|day| day == today)
}

/// Expands literal `\n` sequences from the settings file.
#[must_use]
pub fn expand_body(body: &str) -> String {
    body.replace("\\n", "\n")
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| Error::Mail(format!("invalid address {address}: {e}")))
}

/// Builds the log email with the workbook attached.
///
/// # Errors
///
/// Returns an error if an address is invalid or no recipient is configured.
pub fn build_message(
    settings: &EmailSettings,
    attachment_name: &str,
    attachment: Vec<u8>,
) -> Result<Message> {
    if settings.recipients.is_empty() {
        return Err(Error::Mail("No recipients specified".into()));
    }

    let mut builder = Message::builder()
        .from(mailbox(&settings.login_id)?)
        .subject(settings.subject.clone());
    for recipient in &settings.recipients {
        builder = builder.to(mailbox(recipient)?);
    }

    let content_type =
        ContentType::parse(XLSX_CONTENT_TYPE).map_err(|e| Error::Mail(e.to_string()))?;
    let body = MultiPart::mixed()
        .singlepart(SinglePart::plain(expand_body(&settings.body)))
        .singlepart(Attachment::new(attachment_name.to_string()).body(attachment, content_type));

    builder
        .multipart(body)
        .map_err(|e| Error::Mail(e.to_string()))
}

/// Sends the workbook at `path` over SMTP with STARTTLS.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the message cannot be built,
/// or the relay rejects the connection, login or message.
pub async fn send_log(settings: &EmailSettings, path: &Path) -> Result<()> {
    let attachment = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map_or_else(|| "Overdue_Log.xlsx".into(), |n| n.to_string_lossy().into_owned());
    let message = build_message(settings, &name, attachment)?;

    debug!("Connecting to {}:{}", settings.server, settings.port);
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
        .map_err(|e| Error::Mail(format!("Connection failed: {e}")))?
        .port(settings.port)
        .credentials(Credentials::new(
            settings.login_id.clone(),
            settings.login_pw.clone(),
        ))
        .build();

    mailer
        .send(message)
        .await
        .map_err(|e| Error::Mail(format!("Send failed: {e}")))?;

    info!(
        recipients = settings.recipients.len(),
        "Overdue log emailed as {name}"
    );
    Ok(())
}

/// Sends the workbook when `today` is the configured send day.
///
/// Returns whether the email was sent.
///
/// # Errors
///
/// Returns any error from [`send_log`].
pub async fn send_if_due(settings: &EmailSettings, path: &Path, today: NaiveDate) -> Result<bool> {
    if !is_send_day(settings, today.weekday()) {
        debug!(
            "Not sending the log: today is {}, send day is {}",
            today.weekday(),
            settings.send_on_day
        );
        return Ok(false);
    }
    send_log(settings, path).await?;
    Ok(true)
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
    use crate::config::Settings;
    use crate::config::tests::FULL_SETTINGS;

    fn email() -> EmailSettings {
        Settings::from_toml(FULL_SETTINGS).unwrap().email.unwrap()
    }

    #[test]
    fn test_send_day() {
        let settings = email();
        assert!(is_send_day(&settings, Weekday::Mon));
        assert!(!is_send_day(&settings, Weekday::Tue));

        let mut lowercase = settings.clone();
        lowercase.send_on_day = " friday ".to_string();
        assert!(is_send_day(&lowercase, Weekday::Fri));

        let mut bogus = settings;
        bogus.send_on_day = "Payday".to_string();
        assert!(!is_send_day(&bogus, Weekday::Mon));
    }

    #[tokio::test]
    async fn test_not_sent_on_other_days() {
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let sent = send_if_due(&email(), Path::new("/nonexistent.xlsx"), tuesday)
            .await
            .unwrap();
        assert!(!sent);
    }

    #[test]
    fn test_expand_body() {
        assert_eq!(expand_body("Hi,\\nSee attached."), "Hi,\nSee attached.");
        assert_eq!(expand_body("plain"), "plain");
    }

    #[test]
    fn test_build_message_attaches_workbook() {
        let message = build_message(&email(), "Overdue_Log_2024.xlsx", b"PK\x03\x04".to_vec())
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Subject: Overdue log"));
        assert!(raw.contains("From: ar@example.com"));
        assert!(raw.contains("accounts@example.com"));
        assert!(raw.contains("boss@example.com"));
        assert!(raw.contains("Overdue_Log_2024.xlsx"));
        assert!(raw.contains("spreadsheetml.sheet"));
        assert!(raw.contains("The log is attached."));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mut settings = email();
        settings.recipients = vec!["not an address".into()];
        let err = build_message(&settings, "log.xlsx", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Mail(msg) if msg.contains("not an address")));

        settings.recipients.clear();
        assert!(build_message(&settings, "log.xlsx", Vec::new()).is_err());
    }
}

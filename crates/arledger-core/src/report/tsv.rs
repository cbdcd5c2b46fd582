//! Tab-separated run logs.

use std::io;
use std::path::Path;

use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};

use crate::error::Result;
use crate::overdue::{Invoice, Summary};

/// Columns of the detailed log.
pub const DETAILED_HEADER: [&str; 9] = [
    "Number",
    "Date",
    "DisplayID",
    "Name",
    "BalanceDueAmount",
    "Subtotal",
    "TotalTax",
    "TotalAmount",
    "JournalMemo",
];

/// Columns of the summary log.
pub const SUMMARY_HEADER: [&str; 4] = [
    "Name",
    "Prop:ExcludeFromDebtCollecting",
    "TotalOwing",
    "Alert Notes",
];

fn builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b'\t')
        .quote(b'|')
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF);
    builder
}

fn amount(value: f64) -> String {
    format!("{value:?}")
}

/// Writes one line per invoice.
///
/// # Errors
///
/// Returns an error if a record cannot be written.
pub fn write_detailed<W: io::Write>(writer: W, invoices: &[Invoice]) -> Result<()> {
    let mut out: Writer<W> = builder().from_writer(writer);
    out.write_record(DETAILED_HEADER)?;
    for invoice in invoices {
        out.write_record([
            invoice.number.clone(),
            invoice.display_date(),
            invoice.customer.display_id.clone(),
            invoice.customer.name.clone(),
            amount(invoice.balance_due_amount),
            amount(invoice.subtotal),
            amount(invoice.total_tax),
            amount(invoice.total_amount),
            invoice.journal_memo.clone().unwrap_or_default(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Writes one line per summarized customer.
///
/// # Errors
///
/// Returns an error if a record cannot be written.
pub fn write_summary<W: io::Write>(writer: W, summary: &Summary) -> Result<()> {
    let mut out: Writer<W> = builder().from_writer(writer);
    out.write_record(SUMMARY_HEADER)?;
    for (account, customer) in summary {
        let total = amount(customer.total_owing);
        out.write_record([
            account.as_str(),
            if customer.excluded { "1" } else { "0" },
            total.as_str(),
            customer.alert_text.as_deref().unwrap_or_default(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Writes the detailed log to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_detailed_file(path: &Path, invoices: &[Invoice]) -> Result<()> {
    write_detailed(std::fs::File::create(path)?, invoices)
}

/// Writes the summary log to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_summary_file(path: &Path, summary: &Summary) -> Result<()> {
    write_summary(std::fs::File::create(path)?, summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::overdue::{CustomerSummary, Invoice};
    use serde_json::json;

    fn invoice(memo: &str) -> Invoice {
        Invoice::from_item(&json!({
            "Number": "00000123",
            "Date": "2024-01-02T00:00:00",
            "Customer": {"Name": "Acme Pty Ltd", "DisplayID": "C001"},
            "BalanceDueAmount": 55.5,
            "Subtotal": 100.0,
            "TotalTax": 10.0,
            "TotalAmount": 110.0,
            "JournalMemo": memo
        }))
        .unwrap()
    }

    #[test]
    fn test_detailed_log() {
        let mut buffer = Vec::new();
        write_detailed(&mut buffer, &[invoice("Sale; Acme")]).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(
            text,
            "Number\tDate\tDisplayID\tName\tBalanceDueAmount\tSubtotal\tTotalTax\tTotalAmount\tJournalMemo\r\n\
             00000123\t02/01/2024\tC001\tAcme Pty Ltd\t55.5\t100.0\t10.0\t110.0\tSale; Acme\r\n"
        );
    }

    #[test]
    fn test_fields_with_tabs_use_pipe_quotes() {
        let mut buffer = Vec::new();
        write_detailed(&mut buffer, &[invoice("split\there")]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.ends_with("\t|split\there|\r\n"));
    }

    #[test]
    fn test_summary_log() {
        let mut summary = Summary::new();
        summary.insert(
            "C001".into(),
            CustomerSummary {
                excluded: true,
                total_owing: 12.25,
                alert_text: Some("Call first".into()),
            },
        );
        summary.insert("C002".into(), CustomerSummary::default());

        let mut buffer = Vec::new();
        write_summary(&mut buffer, &summary).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(
            text,
            "Name\tProp:ExcludeFromDebtCollecting\tTotalOwing\tAlert Notes\r\n\
             C001\t1\t12.25\tCall first\r\n\
             C002\t0\t0.0\t\r\n"
        );
    }

    #[test]
    fn test_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_detailed.txt");
        write_detailed_file(&path, &[invoice("m")]).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("Number\t"));
    }
}

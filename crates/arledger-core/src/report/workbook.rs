//! Excel overdue log.

use std::path::Path;

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::tsv::{DETAILED_HEADER, SUMMARY_HEADER};
use crate::error::Result;
use crate::overdue::{Invoice, Summary};

/// Name of the per-customer sheet.
pub const SUMMARY_SHEET: &str = "Summary";
/// Name of the per-invoice sheet.
pub const DETAILED_SHEET: &str = "Detailed";

const HEADER_ROW: u32 = 5;
const FIRST_DATA_ROW: u32 = 6;
const FONT_NAME: &str = "Arial Narrow";
const FONT_SIZE: u32 = 11;

struct Formats {
    cell: Format,
    heading: Format,
}

impl Formats {
    fn new() -> Self {
        let cell = Format::new()
            .set_font_name(FONT_NAME)
            .set_font_size(FONT_SIZE);
        let heading = cell.clone().set_bold();
        Self { cell, heading }
    }
}

fn write_banner(
    sheet: &mut Worksheet,
    title: &str,
    date_col: u16,
    date: &str,
    formats: &Formats,
) -> std::result::Result<(), XlsxError> {
    sheet.write_string_with_format(0, 0, title, &formats.heading)?;
    sheet.write_string_with_format(0, date_col - 1, "Date:", &formats.heading)?;
    sheet.write_string_with_format(0, date_col, date, &formats.cell)?;
    Ok(())
}

fn write_header(
    sheet: &mut Worksheet,
    header: &[&str],
    formats: &Formats,
) -> std::result::Result<(), XlsxError> {
    for (col, name) in (0u16..).zip(header) {
        sheet.write_string_with_format(HEADER_ROW, col, *name, &formats.heading)?;
    }
    Ok(())
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    summary: &Summary,
    date: &str,
    formats: &Formats,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name(SUMMARY_SHEET)?;
    write_banner(sheet, "Overdue Summary", 3, date, formats)?;
    write_header(sheet, &SUMMARY_HEADER, formats)?;

    for (row, (account, customer)) in (FIRST_DATA_ROW..).zip(summary) {
        sheet.write_string_with_format(row, 0, account, &formats.cell)?;
        sheet.write_number_with_format(row, 1, u8::from(customer.excluded), &formats.cell)?;
        sheet.write_number_with_format(row, 2, customer.total_owing, &formats.cell)?;
        if let Some(notes) = &customer.alert_text {
            sheet.write_string_with_format(row, 3, notes, &formats.cell)?;
        }
    }
    Ok(())
}

fn write_detailed_sheet(
    sheet: &mut Worksheet,
    invoices: &[Invoice],
    date: &str,
    formats: &Formats,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name(DETAILED_SHEET)?;
    write_banner(sheet, "Overdue Invoices", 5, date, formats)?;
    write_header(sheet, &DETAILED_HEADER, formats)?;

    for (row, invoice) in (FIRST_DATA_ROW..).zip(invoices) {
        sheet.write_string_with_format(row, 0, &invoice.number, &formats.cell)?;
        sheet.write_string_with_format(row, 1, invoice.display_date(), &formats.cell)?;
        sheet.write_string_with_format(row, 2, &invoice.customer.display_id, &formats.cell)?;
        sheet.write_string_with_format(row, 3, &invoice.customer.name, &formats.cell)?;
        sheet.write_number_with_format(row, 4, invoice.balance_due_amount, &formats.cell)?;
        sheet.write_number_with_format(row, 5, invoice.subtotal, &formats.cell)?;
        sheet.write_number_with_format(row, 6, invoice.total_tax, &formats.cell)?;
        sheet.write_number_with_format(row, 7, invoice.total_amount, &formats.cell)?;
        if let Some(memo) = &invoice.journal_memo {
            sheet.write_string_with_format(row, 8, memo, &formats.cell)?;
        }
    }
    Ok(())
}

/// Writes the two-sheet overdue log to `path`.
///
/// # Errors
///
/// Returns an error if the workbook cannot be built or saved.
pub fn write_workbook(
    path: &Path,
    summary: &Summary,
    invoices: &[Invoice],
    today: NaiveDate,
) -> Result<()> {
    let date = today.format("%d/%m/%Y").to_string();
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    write_summary_sheet(workbook.add_worksheet(), summary, &date, &formats)?;
    write_detailed_sheet(workbook.add_worksheet(), invoices, &date, &formats)?;

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::overdue::CustomerSummary;
    use serde_json::json;
    use std::io::Read;

    fn summary() -> Summary {
        let mut summary = Summary::new();
        summary.insert(
            "C001".into(),
            CustomerSummary {
                excluded: false,
                total_owing: 10.0,
                alert_text: None,
            },
        );
        summary
    }

    fn invoice() -> Invoice {
        Invoice::from_item(&json!({
            "Number": "00000123",
            "Date": "2024-01-02T00:00:00",
            "Customer": {"Name": "Acme Pty Ltd", "DisplayID": "C001"},
            "BalanceDueAmount": 10.0,
            "Subtotal": 10.0,
            "TotalTax": 0.0,
            "TotalAmount": 10.0,
            "JournalMemo": null
        }))
        .unwrap()
    }

    fn part(path: &Path, name: &str) -> String {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_workbook_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Overdue_Log_2024-03-15-090000.xlsx");

        write_workbook(
            &path,
            &summary(),
            &[],
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        )
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_workbook_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Overdue_Log.xlsx");
        write_workbook(
            &path,
            &summary(),
            &[invoice()],
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        )
        .unwrap();

        let workbook = part(&path, "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Summary""#));
        assert!(workbook.contains(r#"name="Detailed""#));

        let summary_sheet = part(&path, "xl/worksheets/sheet1.xml");
        for cell in ["D1", "A6", "D6", "A7", "C7"] {
            assert!(summary_sheet.contains(&format!(r#"r="{cell}""#)), "{cell}");
        }
        assert!(!summary_sheet.contains(r#"r="A2""#));
        assert!(!summary_sheet.contains(r#"r="A8""#));
        assert!(summary_sheet.contains("<v>10</v>"));

        let detailed_sheet = part(&path, "xl/worksheets/sheet2.xml");
        for cell in ["F1", "A6", "I6", "A7", "H7"] {
            assert!(detailed_sheet.contains(&format!(r#"r="{cell}""#)), "{cell}");
        }
        assert!(!detailed_sheet.contains(r#"r="D1""#));
        assert!(!detailed_sheet.contains(r#"r="A8""#));

        let strings = part(&path, "xl/sharedStrings.xml");
        assert!(strings.contains("15/03/2024"));
        assert!(strings.contains("02/01/2024"));
        assert!(strings.contains("Alert Notes"));

        let styles = part(&path, "xl/styles.xml");
        assert!(styles.contains(r#"<name val="Arial Narrow"/>"#));
        assert!(styles.contains(r#"<sz val="11"/>"#));
    }
}

//! Run logs: tab-separated detail and summary files plus the Excel log.

mod tsv;
mod workbook;

pub use tsv::{
    DETAILED_HEADER, SUMMARY_HEADER, write_detailed, write_detailed_file, write_summary,
    write_summary_file,
};
pub use workbook::{DETAILED_SHEET, SUMMARY_SHEET, write_workbook};

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Timestamp format shared by every file of one run.
pub const STAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Paths of the files produced by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    /// Per-invoice log.
    pub detailed: PathBuf,
    /// Per-customer log.
    pub summary: PathBuf,
    /// Excel log.
    pub workbook: PathBuf,
}

impl ReportFiles {
    /// Names the files for a run started at `started` inside `folder`.
    #[must_use]
    pub fn new(folder: &Path, started: NaiveDateTime) -> Self {
        let stamp = started.format(STAMP_FORMAT);
        Self {
            detailed: folder.join(format!("log_{stamp}_detailed.txt")),
            summary: folder.join(format!("log_{stamp}_summary.txt")),
            workbook: folder.join(format!("Overdue_Log_{stamp}.xlsx")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_file_names_share_one_stamp() {
        let started = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        let files = ReportFiles::new(Path::new("/logs"), started);

        assert_eq!(files.detailed, Path::new("/logs/log_2024-03-04-090507_detailed.txt"));
        assert_eq!(files.summary, Path::new("/logs/log_2024-03-04-090507_summary.txt"));
        assert_eq!(files.workbook, Path::new("/logs/Overdue_Log_2024-03-04-090507.xlsx"));
    }
}

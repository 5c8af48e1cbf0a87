//! Output module for exports, reports and statistics
//!
//! This module handles:
//! - Exporting a session to a JSON document and importing it back
//! - Generating markdown session reports
//! - Printing database statistics and run summaries

mod export;
mod markdown;
pub mod stats;

pub use export::{
    export_session, import_session, read_export, write_export, ExportDocument, ExportedCategory,
    ExportedLink, ExportedProduct, EXPORT_FORMAT_VERSION,
};
pub use markdown::{
    format_markdown_report, load_session_report, write_markdown_report, SessionReport,
};
pub use stats::{load_statistics, print_run_summary, print_statistics, HarvestStatistics};

use std::path::{Path, PathBuf};

/// Export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Default export path: `<export_dir>/export_<session>_<timestamp>.<ext>`
pub fn default_export_path(
    export_dir: &Path,
    session_id: &str,
    format: ExportFormat,
    now: chrono::DateTime<chrono::Utc>,
) -> PathBuf {
    export_dir.join(format!(
        "export_{}_{}.{}",
        session_id,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_export_path() {
        let now = chrono::Utc.with_ymd_and_hms(2025, 7, 15, 23, 47, 53).unwrap();
        let path = default_export_path(Path::new("db/exports"), "s1", ExportFormat::Markdown, now);
        assert_eq!(path, Path::new("db/exports/export_s1_20250715_234753.md"));
    }
}

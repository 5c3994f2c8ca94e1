/*!
Change report persistence.

Reports land in a `reports/` directory under the snapshot output directory,
one file per backup run, and only when there is something to report.
*/

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::diff::ChangeReport;
use crate::metadata::report_file_name;
use crate::snapshot::write_json_atomically;
use crate::Result;

/// Name of the report directory inside the output directory
pub const REPORT_DIR: &str = "reports";

/// Output formats for change reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// JSON array of `{"old"?: …, "new": …}` objects
    #[default]
    Json,
}

/// Writes change reports under `{output_dir}/reports`
#[derive(Debug, Clone)]
pub struct ReportWriter {
    report_dir: PathBuf,
    format: ReportFormat,
}

impl ReportWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            report_dir: output_dir.as_ref().join(REPORT_DIR),
            format: ReportFormat::default(),
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Write `report` as `changes_{base}_{YYYY-MM-DD_HHMM}.json`
    ///
    /// Returns `None` without touching the disk when the report is empty.
    ///
    /// # Errors
    /// * `TableSnapError::Persistence` - the report could not be written
    pub fn write(
        &self,
        report: &ChangeReport,
        base_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        if report.is_empty() {
            return Ok(None);
        }

        let path = match self.format {
            ReportFormat::Json => {
                let path = self.report_dir.join(report_file_name(base_name, at));
                write_json_atomically(&path, report)?;
                path
            }
        };

        info!(changes = report.len(), path = %path.display(), "Wrote change report");
        Ok(Some(path))
    }

    /// Write `report` to exactly `path`, including an empty report
    ///
    /// Missing parent directories are created; the file only appears once
    /// it is completely written.
    pub fn write_to(&self, report: &ChangeReport, path: &Path) -> Result<()> {
        match self.format {
            ReportFormat::Json => write_json_atomically(path, report)?,
        }

        info!(changes = report.len(), path = %path.display(), "Wrote change report");
        Ok(())
    }
}

/*!
Snapshot metadata and the file naming convention.

Snapshot files carry no envelope: the table's base name and the capture time
live only in the file name, `{base}[_{YYYY-MM-DD_HHMM}].json`. The timestamp
format sorts lexicographically in chronological order, which is what
previous-snapshot selection relies on.
*/

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minute-resolution UTC timestamp embedded in file names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M";

/// Extension of snapshot and report files
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Length of a formatted [`TIMESTAMP_FORMAT`] value
const TIMESTAMP_LEN: usize = "YYYY-MM-DD_HHMM".len();

/// Prefix of change report file names
pub const REPORT_PREFIX: &str = "changes";

/// Where a snapshot came from and when it was taken
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotMetadata {
    /// Table the records were scanned from
    pub table_name: String,

    /// File base name: an explicit override, or the table name
    pub base_name: String,

    /// Scan completion time
    pub captured_at: DateTime<Utc>,

    /// Number of records in the snapshot
    pub record_count: usize,
}

impl SnapshotMetadata {
    /// Create metadata for a snapshot of `table_name` captured now
    ///
    /// # Example
    /// ```rust
    /// use tablesnap_core::SnapshotMetadata;
    ///
    /// let metadata = SnapshotMetadata::new("users", None, 3);
    /// assert_eq!(metadata.base_name, "users");
    ///
    /// let metadata = SnapshotMetadata::new("users", Some("prod_users"), 3);
    /// assert_eq!(metadata.base_name, "prod_users");
    /// ```
    pub fn new(table_name: &str, base_file_name: Option<&str>, record_count: usize) -> Self {
        Self::captured_at(table_name, base_file_name, record_count, Utc::now())
    }

    /// Create metadata with an explicit capture time
    pub fn captured_at(
        table_name: &str,
        base_file_name: Option<&str>,
        record_count: usize,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            table_name: table_name.to_string(),
            base_name: base_file_name.unwrap_or(table_name).to_string(),
            captured_at,
            record_count,
        }
    }

    /// Snapshot file name, with or without the timestamp suffix
    pub fn file_name(&self, include_timestamp: bool) -> String {
        if include_timestamp {
            snapshot_file_name(&self.base_name, Some(self.captured_at))
        } else {
            snapshot_file_name(&self.base_name, None)
        }
    }

    /// Change report file name for this capture
    pub fn report_file_name(&self) -> String {
        report_file_name(&self.base_name, self.captured_at)
    }
}

/// Format a capture time the way file names embed it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `{base}.json` or `{base}_{YYYY-MM-DD_HHMM}.json`
pub fn snapshot_file_name(base_name: &str, captured_at: Option<DateTime<Utc>>) -> String {
    match captured_at {
        Some(at) => format!("{base_name}_{}.{SNAPSHOT_EXTENSION}", format_timestamp(at)),
        None => format!("{base_name}.{SNAPSHOT_EXTENSION}"),
    }
}

/// `changes_{base}_{YYYY-MM-DD_HHMM}.json`
pub fn report_file_name(base_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{REPORT_PREFIX}_{base_name}_{}.{SNAPSHOT_EXTENSION}",
        format_timestamp(at)
    )
}

/// Split a snapshot file name into its base name and optional capture time
///
/// Returns `None` for names without the `.json` extension. A stem whose tail
/// does not parse as a timestamp is taken whole as the base name.
pub fn parse_snapshot_file_name(file_name: &str) -> Option<(String, Option<DateTime<Utc>>)> {
    let stem = file_name.strip_suffix(&format!(".{SNAPSHOT_EXTENSION}"))?;

    if stem.len() > TIMESTAMP_LEN && stem.is_char_boundary(stem.len() - TIMESTAMP_LEN) {
        let (head, tail) = stem.split_at(stem.len() - TIMESTAMP_LEN);
        if let Some(base) = head.strip_suffix('_') {
            if let Ok(naive) = NaiveDateTime::parse_from_str(tail, TIMESTAMP_FORMAT) {
                return Some((base.to_string(), Some(naive.and_utc())));
            }
        }
    }

    Some((stem.to_string(), None))
}

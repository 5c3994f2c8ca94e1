/*!
The backup pipeline: scan, snapshot, compare, report.

[`BackupEngine`] ties a [`RecordStoreClient`] to the file-level pieces of the
crate. The snapshot is the primary artifact of a run; the change report is
secondary, so report problems are returned inside [`BackupOutcome`] instead
of failing a backup whose snapshot is already on disk.
*/

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::DiffConfig;
use crate::diff::{ChangeReport, DiffEngine};
use crate::record::{Record, DEFAULT_IDENTITY_KEY};
use crate::report::{ReportFormat, ReportWriter};
use crate::restore::{restore_file, RestoreSummary};
use crate::scanner::scan_table;
use crate::selector::SnapshotSelector;
use crate::snapshot::{read_snapshot, Snapshot, SnapshotWriter};
use crate::store::RecordStoreClient;
use crate::{Result, TableSnapError};

/// Parameters of a single backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub table_name: String,
    pub output_dir: PathBuf,
    /// File base name; defaults to the table name
    pub base_file_name: Option<String>,
    pub include_timestamp: bool,
    /// Produce a change report against the previous snapshot
    pub report: Option<ReportFormat>,
}

impl BackupRequest {
    /// Timestamped backup of `table_name` into `output_dir`, no report
    pub fn new<S: Into<String>, P: Into<PathBuf>>(table_name: S, output_dir: P) -> Self {
        Self {
            table_name: table_name.into(),
            output_dir: output_dir.into(),
            base_file_name: None,
            include_timestamp: true,
            report: None,
        }
    }

    pub fn with_base_file_name<S: Into<String>>(mut self, base_file_name: S) -> Self {
        self.base_file_name = Some(base_file_name.into());
        self
    }

    pub fn with_timestamp(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }

    pub fn with_report(mut self, format: ReportFormat) -> Self {
        self.report = Some(format);
        self
    }

    /// Base name used for snapshot and report files
    pub fn base_name(&self) -> &str {
        self.base_file_name.as_deref().unwrap_or(&self.table_name)
    }
}

/// What happened to the change report of a backup run
#[derive(Debug)]
pub enum ReportOutcome {
    NotRequested,
    /// No earlier snapshot of this base name exists
    NoPreviousSnapshot,
    NoChanges { previous: PathBuf },
    Written {
        previous: PathBuf,
        path: PathBuf,
        changes: usize,
    },
    /// The snapshot was written but the report could not be produced
    Failed(TableSnapError),
}

impl ReportOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReportOutcome::Failed(_))
    }
}

/// Result of a backup whose snapshot reached disk
#[derive(Debug)]
pub struct BackupOutcome {
    pub snapshot_path: PathBuf,
    pub record_count: usize,
    pub report: ReportOutcome,
}

/// Runs backups and restores against one record store
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use tablesnap_core::{BackupEngine, BackupRequest, DiffConfig, MemoryRecordStore};
///
/// let store = MemoryRecordStore::new("id");
/// store.insert("users", json!([{"id": 1, "number": 1}]))?;
///
/// let dir = tempfile::tempdir()?;
/// let engine = BackupEngine::new(store, DiffConfig::default());
/// let outcome = engine.backup(&BackupRequest::new("users", dir.path()))?;
/// assert_eq!(outcome.record_count, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BackupEngine<C: RecordStoreClient> {
    client: C,
    diff_config: DiffConfig,
}

impl<C: RecordStoreClient> BackupEngine<C> {
    pub fn new(client: C, diff_config: DiffConfig) -> Self {
        Self {
            client,
            diff_config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn diff_config(&self) -> &DiffConfig {
        &self.diff_config
    }

    /// Back up one table and optionally report changes since the last backup
    ///
    /// The previous snapshot is chosen before the new one is written, so a
    /// run never compares a snapshot with itself.
    ///
    /// # Errors
    /// * `TableSnapError::Retrieval` - the scan failed; nothing was written
    /// * `TableSnapError::Persistence` - the snapshot could not be written
    pub fn backup(&self, request: &BackupRequest) -> Result<BackupOutcome> {
        let table = request.table_name.as_str();
        let base_name = request.base_name();

        let records = scan_table(&self.client, table)?;

        let previous = match request.report {
            Some(_) => Some(self.load_previous(&request.output_dir, base_name)),
            None => None,
        };

        let snapshot = Snapshot::capture(table, request.base_file_name.as_deref(), records);
        let snapshot_path = SnapshotWriter::new(&request.output_dir)
            .with_timestamp(request.include_timestamp)
            .write_snapshot(&snapshot)?;

        let report = match (request.report, previous) {
            (Some(format), Some(previous)) => {
                let writer = ReportWriter::new(&request.output_dir).with_format(format);
                self.report_changes(&writer, &snapshot, previous)
            }
            _ => ReportOutcome::NotRequested,
        };

        if let ReportOutcome::Failed(e) = &report {
            warn!(table = %table, error = %e, "Backup written but change report failed");
        }

        info!(
            table = %table,
            records = snapshot.records.len(),
            path = %snapshot_path.display(),
            "Backup complete"
        );

        Ok(BackupOutcome {
            snapshot_path,
            record_count: snapshot.records.len(),
            report,
        })
    }

    /// Restore a snapshot file into `table`
    pub fn restore_file<P: AsRef<Path>>(&self, table: &str, path: P) -> Result<RestoreSummary> {
        restore_file(&self.client, table, path)
    }

    /// Identity field for `table`: configured, else the partition key, else `id`
    pub fn identity_key(&self, table: &str) -> Result<String> {
        if let Some(key) = &self.diff_config.identity_key {
            return Ok(key.clone());
        }
        Ok(self
            .client
            .partition_key(table)?
            .unwrap_or_else(|| DEFAULT_IDENTITY_KEY.to_string()))
    }

    fn load_previous(
        &self,
        output_dir: &Path,
        base_name: &str,
    ) -> Result<Option<(PathBuf, Vec<Record>)>> {
        let selector = SnapshotSelector::from_mode(self.diff_config.match_mode);
        match selector.find_previous(output_dir, base_name)? {
            Some(path) => {
                let records = read_snapshot(&path)?;
                Ok(Some((path, records)))
            }
            None => Ok(None),
        }
    }

    fn report_changes(
        &self,
        writer: &ReportWriter,
        snapshot: &Snapshot,
        previous: Result<Option<(PathBuf, Vec<Record>)>>,
    ) -> ReportOutcome {
        let (previous_path, previous_records) = match previous {
            Ok(Some(previous)) => previous,
            Ok(None) => return ReportOutcome::NoPreviousSnapshot,
            Err(e) => return ReportOutcome::Failed(e),
        };

        let metadata = &snapshot.metadata;
        let report =
            match self.build_report(&metadata.table_name, &previous_records, &snapshot.records) {
                Ok(report) => report,
                Err(e) => return ReportOutcome::Failed(e),
            };

        match writer.write(&report, &metadata.base_name, metadata.captured_at) {
            Ok(Some(path)) => ReportOutcome::Written {
                previous: previous_path,
                path,
                changes: report.len(),
            },
            Ok(None) => ReportOutcome::NoChanges {
                previous: previous_path,
            },
            Err(e) => ReportOutcome::Failed(e),
        }
    }

    fn build_report(
        &self,
        table: &str,
        previous: &[Record],
        current: &[Record],
    ) -> Result<ChangeReport> {
        let engine = DiffEngine::new(self.identity_key(table)?)
            .with_policy(self.diff_config.field_policy);
        let mut report = engine.diff(Some(previous), current)?;
        report.sort_by_field(&self.diff_config.ordering_field)?;
        Ok(report)
    }
}

/// Compare two snapshot files offline and return the sorted report
///
/// Without a store to ask, the identity key is the configured one or `id`.
pub fn diff_snapshot_files<P: AsRef<Path>, Q: AsRef<Path>>(
    old: P,
    new: Q,
    config: &DiffConfig,
) -> Result<ChangeReport> {
    let previous = read_snapshot(old)?;
    let current = read_snapshot(new)?;

    let identity_key = config
        .identity_key
        .clone()
        .unwrap_or_else(|| DEFAULT_IDENTITY_KEY.to_string());
    let mut report = DiffEngine::new(identity_key)
        .with_policy(config.field_policy)
        .diff(Some(previous.as_slice()), &current)?;
    report.sort_by_field(&config.ordering_field)?;
    Ok(report)
}

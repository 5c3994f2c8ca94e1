/*!
# tablesnap core

Point-in-time backups of key-value tables, change reports between
consecutive backups, and restores from a backup file.

A backup run scans a table page by page, writes every record as one JSON
array to a timestamped file, and can compare the result with the most recent
earlier backup of the same base name:

- [`scan_table`] reads a whole table through a [`RecordStoreClient`]
- [`SnapshotWriter`] and [`read_snapshot`] handle snapshot files
- [`SnapshotSelector`] picks the previous snapshot in a directory
- [`DiffEngine`] produces a [`ChangeReport`] of added and modified records
- [`ReportWriter`] persists non-empty reports under `reports/`
- [`restore`] replays records through a [`BulkWriteSession`]

[`BackupEngine`] wires these together.

## Architecture

The store is a port. [`MemoryRecordStore`] is an in-process adapter used by
tests and examples; `DynamoDbRecordStore` (feature `dynamodb`) talks to
DynamoDB or DynamoDB Local. Everything else is synchronous file handling.

## Usage

```rust
use serde_json::json;
use tablesnap_core::{BackupEngine, BackupRequest, DiffConfig, MemoryRecordStore, ReportFormat};

let store = MemoryRecordStore::new("id");
store.insert("users", json!([{"id": 1, "number": 1, "name": "ada"}]))?;

let dir = tempfile::tempdir()?;
let engine = BackupEngine::new(store.clone(), DiffConfig::default());
let request = BackupRequest::new("users", dir.path()).with_report(ReportFormat::Json);

let first = engine.backup(&request)?;
assert_eq!(first.record_count, 1);

store.insert("users", json!([{"id": 2, "number": 2, "name": "grace"}]))?;
let second = engine.backup(&request.clone().with_timestamp(false))?;
assert_eq!(second.record_count, 2);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod observability;
pub mod record;
pub mod report;
pub mod restore;
pub mod scanner;
pub mod selector;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod error_tests;
#[cfg(test)]
mod metadata_tests;

pub use config::{DiffConfig, StoreConfig};
pub use diff::{ChangeRecord, ChangeReport, DiffEngine, FieldComparisonPolicy};
pub use engine::{diff_snapshot_files, BackupEngine, BackupOutcome, BackupRequest, ReportOutcome};
pub use error::{Result, TableSnapError};
pub use metadata::SnapshotMetadata;
pub use record::{ContinuationToken, Record};
pub use report::{ReportFormat, ReportWriter};
pub use restore::{restore, restore_file, RestoreSummary};
pub use scanner::scan_table;
pub use selector::{MatchMode, PrefixMatcher, SnapshotMatcher, SnapshotSelector, SubstringMatcher};
pub use snapshot::{read_snapshot, Snapshot, SnapshotWriter};
#[cfg(feature = "dynamodb")]
pub use store::DynamoDbRecordStore;
pub use store::{BulkWriteSession, MemoryRecordStore, RecordStoreClient, ScanPage};

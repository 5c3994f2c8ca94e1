/*!
In-memory record store.

Behaves like a small DynamoDB table: records are keyed by a partition key,
puts replace an existing record with the same key in place, scans come back in
fixed-size pages with a continuation token. Failure injection hooks let tests
exercise the error paths of the pipeline.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tracing::debug;

use super::{BulkWriteSession, RecordStoreClient, ScanPage};
use crate::record::{identity_of, ContinuationToken, Record, DEFAULT_IDENTITY_KEY};
use crate::{Result, TableSnapError};

/// Page size used by [`MemoryRecordStore::new`]
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Puts buffered by a session before it writes a batch
const SESSION_BATCH_SIZE: usize = 25;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Record>>,
    scan_requests: usize,
    fail_scan_at: Option<usize>,
    puts_applied: usize,
    fail_put_at: Option<usize>,
    flushes: usize,
}

/// In-memory [`RecordStoreClient`]
///
/// Cloning shares the underlying tables, so a test can hand one clone to the
/// engine and inspect the other.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use tablesnap_core::{scan_table, MemoryRecordStore};
///
/// let store = MemoryRecordStore::new("id").with_page_size(2);
/// store.create_table("users");
/// store.insert("users", json!([{"id": 1}, {"id": 2}, {"id": 3}]))?;
///
/// let records = scan_table(&store, "users")?;
/// assert_eq!(records.len(), 3);
/// # Ok::<(), tablesnap_core::TableSnapError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
    partition_key: String,
    page_size: usize,
}

impl MemoryRecordStore {
    /// Create an empty store whose tables are keyed by `partition_key`
    pub fn new<S: Into<String>>(partition_key: S) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            partition_key: partition_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of records returned per scan page (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create `table` if it does not exist yet
    pub fn create_table(&self, table: &str) {
        self.lock().tables.entry(table.to_string()).or_default();
    }

    /// Upsert records into `table`, creating it if needed
    ///
    /// `records` must be a JSON array of objects.
    pub fn insert(&self, table: &str, records: Value) -> Result<()> {
        let Value::Array(items) = records else {
            return Err(TableSnapError::invalid_format("expected a JSON array of records"));
        };
        let mut state = self.lock();
        let rows = state.tables.entry(table.to_string()).or_default();
        for item in items {
            let Value::Object(record) = item else {
                return Err(TableSnapError::invalid_format("expected a JSON object"));
            };
            upsert(rows, record, &self.partition_key)?;
        }
        Ok(())
    }

    /// Current contents of `table` in storage order, or `None` if it does not exist
    pub fn records(&self, table: &str) -> Option<Vec<Record>> {
        self.lock().tables.get(table).cloned()
    }

    /// Number of scan requests served so far, failed ones included
    pub fn scan_requests(&self) -> usize {
        self.lock().scan_requests
    }

    /// Number of session flushes that reached the store
    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }

    /// Fail the `n`th scan request (1-based) with a retrieval error
    pub fn fail_scan_at(&self, n: usize) {
        self.lock().fail_scan_at = Some(n);
    }

    /// Fail once `n` puts have been applied, counting across all sessions
    pub fn fail_put_after(&self, n: usize) {
        self.lock().fail_put_at = Some(n);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStoreClient for MemoryRecordStore {
    fn scan_page(&self, table: &str, token: Option<ContinuationToken>) -> Result<ScanPage> {
        let mut state = self.lock();
        state.scan_requests += 1;
        if state.fail_scan_at == Some(state.scan_requests) {
            return Err(TableSnapError::retrieval(format!(
                "injected failure on scan request {}",
                state.scan_requests
            )));
        }

        let rows = state.tables.get(table).ok_or_else(|| {
            TableSnapError::retrieval(format!("table '{table}' does not exist"))
        })?;

        let offset = match token {
            Some(token) => token
                .key()
                .get("offset")
                .and_then(Value::as_u64)
                .ok_or_else(|| TableSnapError::retrieval("malformed continuation token"))?
                as usize,
            None => 0,
        };

        let end = (offset + self.page_size).min(rows.len());
        let records = rows.get(offset..end).map(<[Record]>::to_vec).unwrap_or_default();
        let next = (end < rows.len()).then(|| offset_token(end));

        debug!(table = %table, offset, returned = records.len(), "Served scan page");
        Ok(ScanPage::new(records, next))
    }

    fn bulk_writer(&self, table: &str) -> Result<Box<dyn BulkWriteSession>> {
        if !self.lock().tables.contains_key(table) {
            return Err(TableSnapError::write(format!("table '{table}' does not exist")));
        }
        Ok(Box::new(MemoryWriteSession {
            store: self.clone(),
            table: table.to_string(),
            pending: Vec::new(),
        }))
    }

    fn partition_key(&self, _table: &str) -> Result<Option<String>> {
        Ok(Some(self.partition_key.clone()))
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_KEY)
    }
}

/// Bulk-write session over a [`MemoryRecordStore`] table
struct MemoryWriteSession {
    store: MemoryRecordStore,
    table: String,
    pending: Vec<Record>,
}

impl BulkWriteSession for MemoryWriteSession {
    fn put(&mut self, record: Record) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= SESSION_BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.store.lock();
        state.flushes += 1;

        for record in std::mem::take(&mut self.pending) {
            if state.fail_put_at == Some(state.puts_applied) {
                return Err(TableSnapError::write(format!(
                    "injected failure after {} puts",
                    state.puts_applied
                )));
            }
            let rows = state.tables.get_mut(&self.table).ok_or_else(|| {
                TableSnapError::write(format!("table '{}' does not exist", self.table))
            })?;
            upsert(rows, record, &self.store.partition_key)
                .map_err(|e| TableSnapError::write(e.to_string()))?;
            state.puts_applied += 1;
        }
        Ok(())
    }
}

fn upsert(rows: &mut Vec<Record>, record: Record, partition_key: &str) -> Result<()> {
    let key = identity_of(&record, partition_key)?;
    let existing = rows
        .iter()
        .position(|row| identity_of(row, partition_key).ok().as_ref() == Some(&key));
    match existing {
        Some(index) => rows[index] = record,
        None => rows.push(record),
    }
    Ok(())
}

fn offset_token(offset: usize) -> ContinuationToken {
    let mut key = Record::new();
    key.insert("offset".to_string(), json!(offset));
    ContinuationToken::new(key)
}

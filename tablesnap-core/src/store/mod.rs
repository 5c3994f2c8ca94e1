/*!
Record store adapters.

The backup and restore pipeline only ever talks to a table through
[`RecordStoreClient`]: scan one page at a time, or open a bulk-write session.
Connection setup, authentication, batching and transport retries all live
behind this port, so the core can run against [`MemoryRecordStore`] in tests
and against DynamoDB in production.
*/

#[cfg(feature = "dynamodb")]
mod attribute;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod memory;

use crate::record::{ContinuationToken, Record};
use crate::Result;

/// One page of a table scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    /// Records in the order the store returned them
    pub records: Vec<Record>,
    /// Present while more pages remain
    pub next: Option<ContinuationToken>,
}

impl ScanPage {
    pub fn new(records: Vec<Record>, next: Option<ContinuationToken>) -> Self {
        Self { records, next }
    }
}

/// Capability to read and write a named table
#[cfg_attr(test, mockall::automock)]
pub trait RecordStoreClient {
    /// Fetch one page of `table`, starting after `token` if given
    ///
    /// # Errors
    /// Any transport or authentication failure the adapter could not absorb
    fn scan_page(&self, table: &str, token: Option<ContinuationToken>) -> Result<ScanPage>;

    /// Open a bulk-write session against `table`
    ///
    /// Sessions batch puts however the store likes; callers must
    /// [`BulkWriteSession::flush`] before dropping them.
    fn bulk_writer(&self, table: &str) -> Result<Box<dyn BulkWriteSession>>;

    /// Name of the table's partition key, when the store can tell
    fn partition_key(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Batched insert-or-replace writes into one table
#[cfg_attr(test, mockall::automock)]
pub trait BulkWriteSession {
    /// Queue a put. May flush a full batch as a side effect.
    fn put(&mut self, record: Record) -> Result<()>;

    /// Write out everything still queued
    fn flush(&mut self) -> Result<()>;
}

// Re-export types for convenience
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbRecordStore;
pub use memory::MemoryRecordStore;

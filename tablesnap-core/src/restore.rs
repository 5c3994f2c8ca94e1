/*!
Replaying a snapshot into a table.

Restore is a plain sequence of insert-or-replace puts through one bulk-write
session. It is not transactional: on failure, batches already flushed stay
in the table.
*/

use std::path::Path;

use tracing::{info, warn};

use crate::record::Record;
use crate::snapshot::read_snapshot;
use crate::store::{BulkWriteSession, RecordStoreClient};
use crate::{Result, TableSnapError};

/// Outcome of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub table_name: String,
    pub records_written: usize,
}

/// Write every record into `table`, in order
///
/// The session is flushed on every exit path. When a put fails, the session
/// is still flushed on the way out and the put's error is the one returned.
///
/// # Errors
/// * `TableSnapError::Write` - opening the session, a put or the final flush failed
pub fn restore<C, I>(client: &C, table: &str, records: I) -> Result<RestoreSummary>
where
    C: RecordStoreClient + ?Sized,
    I: IntoIterator<Item = Record>,
{
    let session = client.bulk_writer(table).map_err(as_write_failure)?;
    let mut scope = SessionScope::new(session, table);

    let mut written = 0usize;
    for record in records {
        scope.put(record)?;
        written += 1;
    }
    scope.close()?;

    #[cfg(feature = "metrics")]
    crate::observability::record_records_written(written);

    info!(table = %table, records = written, "Restored table");
    Ok(RestoreSummary {
        table_name: table.to_string(),
        records_written: written,
    })
}

/// Load a snapshot file and [`restore`] it into `table`
pub fn restore_file<C, P>(client: &C, table: &str, path: P) -> Result<RestoreSummary>
where
    C: RecordStoreClient + ?Sized,
    P: AsRef<Path>,
{
    let records = read_snapshot(path.as_ref())?;
    info!(
        table = %table,
        path = %path.as_ref().display(),
        records = records.len(),
        "Restoring snapshot"
    );
    restore(client, table, records)
}

/// Owns a bulk-write session and flushes it when dropped
struct SessionScope<'a> {
    session: Option<Box<dyn BulkWriteSession>>,
    table: &'a str,
}

impl<'a> SessionScope<'a> {
    fn new(session: Box<dyn BulkWriteSession>, table: &'a str) -> Self {
        Self {
            session: Some(session),
            table,
        }
    }

    fn put(&mut self, record: Record) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.put(record).map_err(as_write_failure),
            None => Err(TableSnapError::write("bulk-write session already closed")),
        }
    }

    /// Flush and release the session, reporting the flush result
    fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.flush().map_err(as_write_failure),
            None => Ok(()),
        }
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.flush() {
                warn!(table = %self.table, error = %e, "Flush after failed restore also failed");
            }
        }
    }
}

fn as_write_failure(error: TableSnapError) -> TableSnapError {
    match error {
        TableSnapError::Write(_) => error,
        other => TableSnapError::write(other.to_string()),
    }
}

//! Exhaustive table scans.

use tracing::{debug, info};

use crate::record::Record;
use crate::store::RecordStoreClient;
use crate::{Result, TableSnapError};

/// Read every record of `table`, following continuation tokens to the end
///
/// Pages are appended in the order the store returns them. The whole table is
/// buffered before returning.
///
/// # Errors
/// * `TableSnapError::Retrieval` - any page request failed; nothing is returned
pub fn scan_table<C: RecordStoreClient + ?Sized>(client: &C, table: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut token = None;
    let mut pages = 0usize;

    loop {
        let page = client.scan_page(table, token.take()).map_err(|e| match e {
            TableSnapError::Retrieval(_) => e,
            other => TableSnapError::retrieval(format!("scan of table '{table}' failed: {other}")),
        })?;
        pages += 1;

        debug!(table = %table, page = pages, records = page.records.len(), "Scanned page");

        #[cfg(feature = "metrics")]
        crate::observability::record_scan_page(page.records.len());

        records.extend(page.records);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(table = %table, pages, records = records.len(), "Scanned table");
    Ok(records)
}

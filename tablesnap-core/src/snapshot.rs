/*!
Snapshot files: writing a scanned table to disk and reading it back.

A snapshot file is a single JSON array of records. Writes go through a
temporary file in the target directory that is renamed over the final path
only once fully written and synced, so a failed write never leaves a
truncated snapshot where the selector could pick it up.
*/

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::metadata::SnapshotMetadata;
use crate::record::Record;
use crate::{Result, TableSnapError};

/// A complete point-in-time copy of one table
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub records: Vec<Record>,
}

impl Snapshot {
    /// Wrap scanned records, stamping the capture time now
    pub fn capture(table_name: &str, base_file_name: Option<&str>, records: Vec<Record>) -> Self {
        Self {
            metadata: SnapshotMetadata::new(table_name, base_file_name, records.len()),
            records,
        }
    }
}

/// Writes snapshots into one output directory
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use tablesnap_core::{read_snapshot, Record, SnapshotWriter};
///
/// let dir = tempfile::tempdir()?;
/// let records: Vec<Record> = vec![json!({"id": 1}).as_object().cloned().unwrap()];
///
/// let writer = SnapshotWriter::new(dir.path()).with_timestamp(false);
/// let path = writer.write(&records, "users", None)?;
/// assert!(path.ends_with("users.json"));
/// assert_eq!(read_snapshot(&path)?, records);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output_dir: PathBuf,
    include_timestamp: bool,
}

impl SnapshotWriter {
    /// Create a writer for `output_dir`; file names carry a timestamp by default
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            include_timestamp: true,
        }
    }

    /// Toggle the `_YYYY-MM-DD_HHMM` file name suffix
    pub fn with_timestamp(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final path a snapshot with this metadata is written to
    pub fn path_for(&self, metadata: &SnapshotMetadata) -> PathBuf {
        self.output_dir
            .join(metadata.file_name(self.include_timestamp))
    }

    /// Capture `records` now and write them
    ///
    /// The base name is `base_file_name` if given, else `table_name`.
    pub fn write(
        &self,
        records: &[Record],
        table_name: &str,
        base_file_name: Option<&str>,
    ) -> Result<PathBuf> {
        let metadata = SnapshotMetadata::new(table_name, base_file_name, records.len());
        self.write_records(&metadata, records)
    }

    /// Write a captured snapshot, returning the file path
    ///
    /// # Errors
    /// * `TableSnapError::Persistence` - directory creation, serialization or
    ///   the final rename failed; nothing is left at the final path
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        self.write_records(&snapshot.metadata, &snapshot.records)
    }

    fn write_records(&self, metadata: &SnapshotMetadata, records: &[Record]) -> Result<PathBuf> {
        let path = self.path_for(metadata);
        write_json_atomically(&path, records)?;

        info!(
            table = %metadata.table_name,
            records = records.len(),
            path = %path.display(),
            "Wrote snapshot"
        );
        Ok(path)
    }
}

/// Load the records of a snapshot file, in file order
///
/// # Errors
/// * `TableSnapError::Io` - the file cannot be opened
/// * `TableSnapError::Json` - the file is not valid JSON
/// * `TableSnapError::InvalidFormat` - the JSON is not an array of objects
pub fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;

    let Value::Array(items) = value else {
        return Err(TableSnapError::invalid_format(format!(
            "{} is not a JSON array",
            path.display()
        )));
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(TableSnapError::invalid_format(format!(
                "element {index} of {} is not an object",
                path.display()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(path = %path.display(), records = records.len(), "Loaded snapshot");
    Ok(records)
}

/// Serialize `value` as JSON to `path` via temp file + rename
///
/// The temporary file lives next to the destination so the rename stays on
/// one filesystem. On any error it is dropped, which deletes it.
pub(crate) fn write_json_atomically<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).map_err(|e| {
        TableSnapError::persistence(format!(
            "Failed to create directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
        TableSnapError::persistence(format!(
            "Failed to create temporary file in {}: {e}",
            dir.display()
        ))
    })?;

    let written = (|| -> std::io::Result<()> {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        drop(writer);
        temp.as_file().sync_all()
    })();
    written.map_err(|e| {
        TableSnapError::persistence(format!("Failed to write {}: {e}", path.display()))
    })?;

    temp.persist(path).map_err(|e| {
        TableSnapError::persistence(format!(
            "Failed to move snapshot into place at {}: {}",
            path.display(),
            e.error
        ))
    })?;

    Ok(())
}

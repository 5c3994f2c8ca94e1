/*!
Error types for the tablesnap core engine.
*/

use thiserror::Error;

/// Result type used throughout the tablesnap core.
pub type Result<T> = std::result::Result<T, TableSnapError>;

/// Errors that can occur during backup, diff and restore operations.
#[derive(Error, Debug)]
pub enum TableSnapError {
    /// Scan, transport or authentication failure while reading the table.
    /// Fatal to the run; no partial snapshot is written.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Disk write failure for a snapshot or report file
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// A changed record is missing the numeric field the report is sorted by.
    /// Fatal to report generation only.
    #[error("Ordering failed: {0}")]
    Ordering(String),

    /// Store error during restore. Records already flushed stay committed.
    #[error("Write failed: {0}")]
    Write(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot content that does not have the expected shape
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl TableSnapError {
    /// Create a new retrieval error
    pub fn retrieval<S: Into<String>>(msg: S) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new ordering error
    pub fn ordering<S: Into<String>>(msg: S) -> Self {
        Self::Ordering(msg.into())
    }

    /// Create a new write error
    pub fn write<S: Into<String>>(msg: S) -> Self {
        Self::Write(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
}

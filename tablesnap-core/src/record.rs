/*!
Schema-less table records and their identity keys.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, TableSnapError};

/// One table entry: field name to arbitrary JSON value
pub type Record = serde_json::Map<String, Value>;

/// Field used as the identity key when neither the caller nor the store names one
pub const DEFAULT_IDENTITY_KEY: &str = "id";

/// Opaque store cursor meaning "more pages remain".
///
/// DynamoDB hands back the primary key of the last evaluated item, so the
/// token carries a record-shaped value; other stores can put whatever they
/// need in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken(Record);

impl ContinuationToken {
    pub fn new(key: Record) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &Record {
        &self.0
    }

    pub fn into_key(self) -> Record {
        self.0
    }
}

/// Canonical string form of a record's identity value.
///
/// JSON values are not hashable, so identity lookups go through their
/// serialized form. `1` and `"1"` stay distinct.
pub fn identity_of(record: &Record, key: &str) -> Result<String> {
    record
        .get(key)
        .map(Value::to_string)
        .ok_or_else(|| TableSnapError::invalid_format(format!("record has no '{key}' field")))
}

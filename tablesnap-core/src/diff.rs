/*!
Change detection between two snapshots of a table.

Records are matched by identity key. A new record without a counterpart is
[`ChangeRecord::Added`]; one whose compared fields differ from its
counterpart is [`ChangeRecord::Modified`]. Records that exist only in the old
snapshot are not reported.
*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::record::{identity_of, Record};
use crate::{Result, TableSnapError};

/// Which fields take part in comparing two versions of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldComparisonPolicy {
    /// Only fields present on the new record; a field dropped since the old
    /// snapshot goes unnoticed
    #[default]
    NewFieldsOnly,
    /// Fields present on either record
    Symmetric,
}

/// One difference between the old and the new snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChangeRecord {
    Added { new: Record },
    Modified { old: Record, new: Record },
}

impl ChangeRecord {
    /// The record as it is now
    pub fn new_record(&self) -> &Record {
        match self {
            ChangeRecord::Added { new } | ChangeRecord::Modified { new, .. } => new,
        }
    }

    /// The record as it was, for modifications
    pub fn old_record(&self) -> Option<&Record> {
        match self {
            ChangeRecord::Added { .. } => None,
            ChangeRecord::Modified { old, .. } => Some(old),
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, ChangeRecord::Added { .. })
    }

    /// Fields of the new record whose value moved, compared the way the
    /// diff compares them; empty for additions
    pub fn changed_fields(&self) -> Vec<&str> {
        match self {
            ChangeRecord::Added { .. } => Vec::new(),
            ChangeRecord::Modified { old, new } => new
                .iter()
                .filter(|(field, value)| {
                    !same_value(old.get(*field).unwrap_or(&Value::Null), value)
                })
                .map(|(field, _)| field.as_str())
                .collect(),
        }
    }
}

/// Ordered list of changes, serialized as a plain JSON array
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeReport {
    changes: Vec<ChangeRecord>,
}

impl ChangeReport {
    pub fn new(changes: Vec<ChangeRecord>) -> Self {
        Self { changes }
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<ChangeRecord> {
        self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.changes.iter()
    }

    /// Sort ascending by the numeric value of `field` on each new record
    ///
    /// The sort is stable. If any new record lacks the field or holds a
    /// non-numeric value, the report is left untouched and the whole sort
    /// fails.
    ///
    /// # Errors
    /// * `TableSnapError::Ordering` - a record cannot be placed
    pub fn sort_by_field(&mut self, field: &str) -> Result<()> {
        let keys = self
            .changes
            .iter()
            .map(|change| ordering_key(change.new_record(), field))
            .collect::<Result<Vec<f64>>>()?;

        let mut keyed: Vec<(f64, ChangeRecord)> =
            keys.into_iter().zip(std::mem::take(&mut self.changes)).collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.changes = keyed.into_iter().map(|(_, change)| change).collect();
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ChangeReport {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

fn ordering_key(record: &Record, field: &str) -> Result<f64> {
    match record.get(field) {
        Some(Value::Number(number)) => number.as_f64().ok_or_else(|| {
            TableSnapError::ordering(format!("'{field}' value {number} is not representable"))
        }),
        Some(other) => Err(TableSnapError::ordering(format!(
            "'{field}' must be numeric, found {other}"
        ))),
        None => Err(TableSnapError::ordering(format!(
            "changed record has no '{field}' field"
        ))),
    }
}

/// Compares snapshots keyed by one identity field
#[derive(Debug, Clone)]
pub struct DiffEngine {
    identity_key: String,
    policy: FieldComparisonPolicy,
}

impl DiffEngine {
    pub fn new<S: Into<String>>(identity_key: S) -> Self {
        Self {
            identity_key: identity_key.into(),
            policy: FieldComparisonPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FieldComparisonPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Changes from `previous` to `current`, in `current` order
    ///
    /// Without a previous snapshot there is nothing to compare against and
    /// the report is empty. Duplicate identities in `previous` resolve to the
    /// last occurrence.
    ///
    /// # Errors
    /// * `TableSnapError::InvalidFormat` - a record lacks the identity field
    pub fn diff(&self, previous: Option<&[Record]>, current: &[Record]) -> Result<ChangeReport> {
        let Some(previous) = previous else {
            return Ok(ChangeReport::default());
        };

        let mut index: HashMap<String, &Record> = HashMap::with_capacity(previous.len());
        for record in previous {
            index.insert(identity_of(record, &self.identity_key)?, record);
        }

        let mut changes = Vec::new();
        for record in current {
            let identity = identity_of(record, &self.identity_key)?;
            match index.get(&identity) {
                None => changes.push(ChangeRecord::Added {
                    new: record.clone(),
                }),
                Some(old) if self.differs(old, record) => changes.push(ChangeRecord::Modified {
                    old: (*old).clone(),
                    new: record.clone(),
                }),
                Some(_) => {}
            }
        }

        debug!(
            previous = previous.len(),
            current = current.len(),
            changes = changes.len(),
            "Computed snapshot diff"
        );
        Ok(ChangeReport::new(changes))
    }

    // An absent field compares equal to an explicit null.
    fn differs(&self, old: &Record, new: &Record) -> bool {
        let changed = |from: &Record, to: &Record| {
            to.iter()
                .any(|(field, value)| !same_value(from.get(field).unwrap_or(&Value::Null), value))
        };

        match self.policy {
            FieldComparisonPolicy::NewFieldsOnly => changed(old, new),
            FieldComparisonPolicy::Symmetric => changed(old, new) || changed(new, old),
        }
    }
}

/// JSON equality where `1` and `1.0` are the same number
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(p), Some(q)) if p == q)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

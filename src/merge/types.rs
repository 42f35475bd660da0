//! Merge data types
//!
//! Defines the value space the reconciler works over:
//! - Records and datasets (ordered JSON objects)
//! - Configurable field names
//! - The tagged shape of a field value (scalar, record, record sequence)

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{MergeError, Result};

/// A single record: an ordered mapping from field name to value
pub type Record = Map<String, Value>;

/// A sequence of records
pub type Dataset = Vec<Record>;

/// Field names the reconciler binds to at call time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    /// Join key between local and server copies of a record
    pub unique_key: String,
    /// Server-assigned key, never diffed
    pub primary_key: String,
    /// Client flag: record created since the last sync
    pub is_new_key: String,
    /// Client flag: record modified since the last sync
    pub updated_key: String,
    /// Client flag: record deleted since the last sync
    pub deleted_key: String,
    /// Field holding the dense zero-based ordering
    pub sorting_key: Option<String>,
    /// Server audit: creation timestamp
    pub created_at_key: Option<String>,
    /// Server audit: last update timestamp
    pub updated_at_key: Option<String>,
    /// Server audit: soft-delete timestamp (physical deletion when unset)
    pub deleted_at_key: Option<String>,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            unique_key: "unique".to_string(),
            primary_key: "id".to_string(),
            is_new_key: "is_new".to_string(),
            updated_key: "updated".to_string(),
            deleted_key: "deleted".to_string(),
            sorting_key: None,
            created_at_key: None,
            updated_at_key: None,
            deleted_at_key: None,
        }
    }
}

impl FieldNames {
    /// Whether `field` is one of the three transient client flags
    pub fn is_flag(&self, field: &str) -> bool {
        field == self.is_new_key || field == self.updated_key || field == self.deleted_key
    }

    /// Whether the attribute differ leaves `field` alone
    pub fn is_skipped(&self, field: &str) -> bool {
        field == self.unique_key || field == self.primary_key || self.is_flag(field)
    }

    /// Whether a server record carries a soft-delete stamp
    pub fn is_soft_deleted(&self, record: &Record) -> bool {
        self.deleted_at_key
            .as_ref()
            .and_then(|key| record.get(key))
            .is_some_and(|stamp| !stamp.is_null())
    }

    /// Whether `value` is an object carrying the unique key
    pub(crate) fn is_record(&self, value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|object| object.contains_key(&self.unique_key))
    }

    /// Remove the transient flags from a record
    pub fn strip_flags(&self, record: &mut Record) {
        record.shift_remove(&self.is_new_key);
        record.shift_remove(&self.updated_key);
        record.shift_remove(&self.deleted_key);
    }
}

/// Which side wins when a scalar field differs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server value is written into the local record
    PullToLocal,
    /// Local value is written into the server record
    PushToServer,
}

/// Value of a record's unique key, usable as a map key
///
/// Text and numeric keys never collide: `"1"` and `1` are different records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniqueKey {
    Text(String),
    Number(String),
    Bool(bool),
}

impl UniqueKey {
    /// Read the unique key of a record
    pub fn of(record: &Record, names: &FieldNames) -> Result<Self> {
        match record.get(&names.unique_key) {
            Some(Value::String(s)) => Ok(UniqueKey::Text(s.clone())),
            Some(Value::Number(n)) => Ok(UniqueKey::Number(n.to_string())),
            Some(Value::Bool(b)) => Ok(UniqueKey::Bool(*b)),
            None | Some(Value::Null) => Err(MergeError::schema(
                &names.unique_key,
                "record has no unique key",
            )),
            Some(other) => Err(MergeError::schema(
                &names.unique_key,
                format!("unique key must be a string, number or boolean, got {}", kind_of(other)),
            )),
        }
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueKey::Text(s) | UniqueKey::Number(s) => f.write_str(s),
            UniqueKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// The three client flags of a local record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags {
    pub is_new: bool,
    pub updated: bool,
    pub deleted: bool,
}

impl SyncFlags {
    /// Read the flags; missing or null flags are false
    pub fn read(record: &Record, names: &FieldNames) -> Result<Self> {
        Ok(Self {
            is_new: read_flag(record, &names.is_new_key)?,
            updated: read_flag(record, &names.updated_key)?,
            deleted: read_flag(record, &names.deleted_key)?,
        })
    }
}

fn read_flag(record: &Record, key: &str) -> Result<bool> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(MergeError::schema(
            key,
            format!("sync flag must be a boolean, got {}", kind_of(other)),
        )),
    }
}

/// Tagged shape of a field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Anything compared by equality, including objects without a unique key
    /// and arrays of non-record values
    Scalar(Value),
    /// A nested record (object carrying the unique key)
    Record(Record),
    /// A nested sequence of records; the empty array lands here
    Records(Vec<Record>),
}

impl FieldValue {
    /// Classify a value taken out of `field`
    pub fn classify(value: Value, field: &str, names: &FieldNames) -> Result<Self> {
        match value {
            Value::Object(record) if record.contains_key(&names.unique_key) => {
                Ok(FieldValue::Record(record))
            }
            Value::Array(items) => {
                let records = items.iter().filter(|item| names.is_record(item)).count();
                if records == items.len() {
                    Ok(FieldValue::Records(
                        items.into_iter().filter_map(into_object).collect(),
                    ))
                } else if records == 0 {
                    Ok(FieldValue::Scalar(Value::Array(items)))
                } else {
                    Err(MergeError::schema(
                        field,
                        format!(
                            "array mixes {} records with {} other values",
                            records,
                            items.len() - records
                        ),
                    ))
                }
            }
            other => Ok(FieldValue::Scalar(other)),
        }
    }

    /// Short name of the shape, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Scalar(value) => kind_of(value),
            FieldValue::Record(_) => "record",
            FieldValue::Records(_) => "record sequence",
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Scalar(value) => value,
            FieldValue::Record(record) => Value::Object(record),
            FieldValue::Records(records) => records_to_value(records),
        }
    }
}

/// Wrap a dataset back into a JSON array
pub fn records_to_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

fn into_object(value: Value) -> Option<Record> {
    match value {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a wire payload into a dataset
///
/// The payload must be a JSON array whose elements are all objects.
pub fn parse_dataset(bytes: &[u8]) -> Result<Dataset> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| MergeError::MalformedInput(format!("invalid JSON: {}", e)))?;
    dataset_from_value(value)
}

/// Convert an already-decoded JSON value into a dataset
pub fn dataset_from_value(value: Value) -> Result<Dataset> {
    let Value::Array(items) = value else {
        return Err(MergeError::MalformedInput(format!(
            "expected a JSON array of records, got {}",
            kind_of(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(MergeError::MalformedInput(format!(
                "element {} is {}, expected an object",
                position,
                kind_of(&other)
            ))),
        })
        .collect()
}

/// Counters describing what one merge did, across all nesting levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records created on the server
    pub created: usize,
    /// Soft-deleted records revived by a create
    pub resurrected: usize,
    /// Records deleted on the server
    pub deleted: usize,
    /// Records whose client edits were pushed to the server
    pub pushed: usize,
    /// Records refreshed from the server
    pub pulled: usize,
    /// Local records dropped because the server no longer has them
    pub dropped: usize,
    /// Server-only records delivered to the client
    pub scavenged: usize,
    /// Sorting values rewritten to close gaps
    pub renumbered: usize,
}

/// Result of one merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Records the client should now hold
    pub to_client: Dataset,
    /// Records to persist upstream
    pub to_server: Dataset,
}

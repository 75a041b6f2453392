//! Typed key/value store for incident attributes.
//!
//! Every field is declared in a [`FieldSchemaSet`] before use; writes are
//! validated against the declared kind and, for enumerations, the legal value
//! set. Successful writes fire synchronous change notifications. Writes to
//! the same field are serialized by a per-field lock held only for the
//! duration of the write; writes to different fields are unordered relative
//! to each other.

pub mod schema;

pub use schema::{ransomware_schema, FieldKind, FieldSchema, FieldSchemaSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the field store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch for field \"{field}\": expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        actual: String,
    },
}

/// A field's current value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Scalar(String),
    Enumeration(String),
    StringList(Vec<String>),
    RecordList(Vec<serde_json::Value>),
}

impl FieldValue {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Creates a scalar value.
    pub fn scalar(s: impl Into<String>) -> Self {
        FieldValue::Scalar(s.into())
    }

    /// Creates an enumeration value.
    pub fn enumeration(s: impl Into<String>) -> Self {
        FieldValue::Enumeration(s.into())
    }

    /// The kind this value conforms to.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Scalar(_) => FieldKind::Scalar,
            FieldValue::Enumeration(_) => FieldKind::Enumeration,
            FieldValue::StringList(_) => FieldKind::StringList,
            FieldValue::RecordList(_) => FieldKind::RecordList,
        }
    }

    /// The value as a string slice, for the scalar-shaped kinds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Scalar(s) | FieldValue::Enumeration(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a string list.
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::StringList(items) => Some(items),
            _ => None,
        }
    }

    /// The value as a record list.
    pub fn as_records(&self) -> Option<&[serde_json::Value]> {
        match self {
            FieldValue::RecordList(records) => Some(records),
            _ => None,
        }
    }

    /// Converts to a JSON value for condition evaluation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) | FieldValue::Scalar(s) | FieldValue::Enumeration(s) => {
                serde_json::Value::String(s.clone())
            }
            FieldValue::StringList(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
            FieldValue::RecordList(records) => serde_json::Value::Array(records.clone()),
        }
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value changed and subscribers were notified.
    Applied,
    /// The incoming value was identical to the stored one; no notification.
    Unchanged,
}

/// Who wrote a field, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteStamp {
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Default)]
struct FieldEntry {
    value: Option<FieldValue>,
    stamp: Option<WriteStamp>,
}

type FieldObserver = Box<dyn Fn(&str, &FieldValue) + Send + Sync>;

/// The incident field store.
///
/// The set of fields is fixed at construction from the schema; only values
/// change afterwards. Each field has its own lock, acquired in arrival order
/// by writers and held only for the write itself. Change callbacks run
/// synchronously on the writer's thread, after the field lock is released.
pub struct FieldStore {
    schema: FieldSchemaSet,
    entries: HashMap<String, Mutex<FieldEntry>>,
    subscribers: RwLock<HashMap<String, Vec<FieldObserver>>>,
}

impl FieldStore {
    /// Creates a store for the given schema with all fields unset.
    pub fn new(schema: FieldSchemaSet) -> Self {
        let entries = schema
            .iter()
            .map(|f| (f.name.clone(), Mutex::new(FieldEntry::default())))
            .collect();
        Self {
            schema,
            entries,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// The schema this store enforces.
    pub fn schema(&self) -> &FieldSchemaSet {
        &self.schema
    }

    /// Reads a field's current value.
    pub fn get(&self, name: &str) -> Result<Option<FieldValue>, FieldError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        Ok(entry.lock().expect("field lock poisoned").value.clone())
    }

    /// Reads a field's last write stamp.
    pub fn stamp(&self, name: &str) -> Result<Option<WriteStamp>, FieldError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        Ok(entry.lock().expect("field lock poisoned").stamp.clone())
    }

    /// Writes a field, enforcing the declared kind.
    ///
    /// Identical values are idempotent: the stored value and stamp are left
    /// untouched and no notification fires.
    pub fn set(
        &self,
        name: &str,
        value: FieldValue,
        writer: &str,
    ) -> Result<WriteOutcome, FieldError> {
        let declared = self
            .schema
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;

        if value.kind() != declared.kind {
            return Err(FieldError::TypeMismatch {
                field: name.to_string(),
                expected: declared.kind,
                actual: value.kind().to_string(),
            });
        }
        if let FieldValue::Enumeration(v) = &value {
            if !declared.allows(v) {
                return Err(FieldError::TypeMismatch {
                    field: name.to_string(),
                    expected: declared.kind,
                    actual: format!("unlisted value \"{v}\""),
                });
            }
        }

        let entry = self.entries.get(name).expect("schema/entries in sync");
        let notify_value = {
            let mut guard = entry.lock().expect("field lock poisoned");
            if guard.value.as_ref() == Some(&value) {
                return Ok(WriteOutcome::Unchanged);
            }
            guard.value = Some(value.clone());
            guard.stamp = Some(WriteStamp {
                updated_at: Utc::now(),
                updated_by: writer.to_string(),
            });
            value
        };

        debug!(field = name, writer, "field updated");
        self.notify(name, &notify_value);
        Ok(WriteOutcome::Applied)
    }

    /// Appends a string to a string-list field, initializing it if unset.
    ///
    /// Appending an item already present is a no-op (no notification).
    pub fn append_string(
        &self,
        name: &str,
        item: impl Into<String>,
        writer: &str,
    ) -> Result<WriteOutcome, FieldError> {
        let item = item.into();
        let declared = self
            .schema
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        if declared.kind != FieldKind::StringList {
            return Err(FieldError::TypeMismatch {
                field: name.to_string(),
                expected: declared.kind,
                actual: format!("appended string item to {}", declared.kind),
            });
        }

        let entry = self.entries.get(name).expect("schema/entries in sync");
        let notify_value = {
            let mut guard = entry.lock().expect("field lock poisoned");
            let items = match guard.value.get_or_insert(FieldValue::StringList(Vec::new())) {
                FieldValue::StringList(items) => items,
                _ => unreachable!("kind validated against schema"),
            };
            if items.contains(&item) {
                return Ok(WriteOutcome::Unchanged);
            }
            items.push(item);
            guard.stamp = Some(WriteStamp {
                updated_at: Utc::now(),
                updated_by: writer.to_string(),
            });
            guard.value.clone().expect("just written")
        };

        self.notify(name, &notify_value);
        Ok(WriteOutcome::Applied)
    }

    /// Appends a record to a record-list field, initializing it if unset.
    pub fn append_record(
        &self,
        name: &str,
        record: serde_json::Value,
        writer: &str,
    ) -> Result<WriteOutcome, FieldError> {
        let declared = self
            .schema
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        if declared.kind != FieldKind::RecordList {
            return Err(FieldError::TypeMismatch {
                field: name.to_string(),
                expected: declared.kind,
                actual: format!("appended record item to {}", declared.kind),
            });
        }
        if !record.is_object() {
            return Err(FieldError::TypeMismatch {
                field: name.to_string(),
                expected: declared.kind,
                actual: "non-object record".to_string(),
            });
        }

        let entry = self.entries.get(name).expect("schema/entries in sync");
        let notify_value = {
            let mut guard = entry.lock().expect("field lock poisoned");
            let records = match guard.value.get_or_insert(FieldValue::RecordList(Vec::new())) {
                FieldValue::RecordList(records) => records,
                _ => unreachable!("kind validated against schema"),
            };
            if records.contains(&record) {
                return Ok(WriteOutcome::Unchanged);
            }
            records.push(record);
            guard.stamp = Some(WriteStamp {
                updated_at: Utc::now(),
                updated_by: writer.to_string(),
            });
            guard.value.clone().expect("just written")
        };

        self.notify(name, &notify_value);
        Ok(WriteOutcome::Applied)
    }

    /// Shallow-merges `patch` into the record whose `"name"` key equals
    /// `record_name` within a record-list field.
    ///
    /// Returns `Unchanged` if no record matches or the patch changes nothing.
    pub fn merge_record(
        &self,
        name: &str,
        record_name: &str,
        patch: &serde_json::Value,
        writer: &str,
    ) -> Result<WriteOutcome, FieldError> {
        let declared = self
            .schema
            .get(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        if declared.kind != FieldKind::RecordList {
            return Err(FieldError::TypeMismatch {
                field: name.to_string(),
                expected: declared.kind,
                actual: format!("merged record into {}", declared.kind),
            });
        }
        let patch_map = match patch.as_object() {
            Some(map) => map,
            None => {
                return Err(FieldError::TypeMismatch {
                    field: name.to_string(),
                    expected: declared.kind,
                    actual: "non-object patch".to_string(),
                })
            }
        };

        let entry = self.entries.get(name).expect("schema/entries in sync");
        let notify_value = {
            let mut guard = entry.lock().expect("field lock poisoned");
            let records = match &mut guard.value {
                Some(FieldValue::RecordList(records)) => records,
                _ => return Ok(WriteOutcome::Unchanged),
            };
            let target = records.iter_mut().find(|r| {
                r.get("name").and_then(|n| n.as_str()) == Some(record_name)
            });
            let object = match target.and_then(|t| t.as_object_mut()) {
                Some(object) => object,
                None => return Ok(WriteOutcome::Unchanged),
            };
            let mut changed = false;
            for (key, value) in patch_map {
                if object.get(key) != Some(value) {
                    object.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
            if !changed {
                return Ok(WriteOutcome::Unchanged);
            }
            guard.stamp = Some(WriteStamp {
                updated_at: Utc::now(),
                updated_by: writer.to_string(),
            });
            guard.value.clone().expect("present above")
        };

        self.notify(name, &notify_value);
        Ok(WriteOutcome::Applied)
    }

    /// Registers a callback fired synchronously after every applied write to
    /// the named field.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<(), FieldError>
    where
        F: Fn(&str, &FieldValue) + Send + Sync + 'static,
    {
        if !self.schema.contains(name) {
            return Err(FieldError::UnknownField(name.to_string()));
        }
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .entry(name.to_string())
            .or_default()
            .push(Box::new(callback));
        Ok(())
    }

    /// A point-in-time copy of all set fields.
    pub fn snapshot(&self) -> HashMap<String, FieldValue> {
        let mut values = HashMap::new();
        for (name, entry) in &self.entries {
            if let Some(value) = &entry.lock().expect("field lock poisoned").value {
                values.insert(name.clone(), value.clone());
            }
        }
        values
    }

    fn notify(&self, name: &str, value: &FieldValue) {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        if let Some(callbacks) = subscribers.get(name) {
            for callback in callbacks {
                callback(name, value);
            }
        }
    }
}

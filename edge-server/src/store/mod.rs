//! Record storage for tasks, plans and monitored groups.
//!
//! Handlers only see the [`Repository`] trait; the in-memory implementation
//! can be swapped for a persistent one without touching the router.

pub mod memory;
pub mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::util::generate_id;

pub use memory::MemoryRepository;
pub use records::{MonitoredGroup, Plan, Subtask, Task, TaskOrigin};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Another record already holds the same unique key.
    #[error("{kind} {key} already exists")]
    Conflict { kind: &'static str, key: String },
    #[error(transparent)]
    Invalid(#[from] RecordError),
}

/// Errors turning client JSON into a record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{kind} body must be a JSON object")]
    NotObject { kind: &'static str },
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

/// A stored record with an id and creation time.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;
    /// Prefix for generated ids.
    const ID_PREFIX: &'static str;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Fill defaults that depend on other fields.
    fn normalize(&mut self) {}

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Secondary key that must be unique across the collection, if any.
    fn unique_key(&self) -> Option<&str> {
        None
    }
}

/// Change applied to a stored record while the repository holds it locked.
pub type RecordUpdate<'a, T> = Box<dyn FnOnce(T) -> Result<T, StoreError> + Send + 'a>;

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Fails on a duplicate id or a taken [`Record::unique_key`].
    async fn insert(&self, record: T) -> Result<T, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;
    /// All records, newest first.
    async fn list(&self) -> Result<Vec<T>, StoreError>;
    /// Read-modify-write of one record as a single step.
    async fn update(&self, id: &str, apply: RecordUpdate<'_, T>) -> Result<T, StoreError>;
    /// Returns whether a record was removed.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

/// Build a new record from a client-supplied JSON object.
///
/// Missing ids are generated; `createdAt` defaults to `now`; `updatedAt` is
/// always `now`.
pub fn record_from_draft<T: Record>(draft: Value, now: DateTime<Utc>) -> Result<T, RecordError> {
    let mut fields = match draft {
        Value::Object(map) => map,
        _ => return Err(RecordError::NotObject { kind: T::KIND }),
    };

    let has_id = fields
        .get("id")
        .and_then(Value::as_str)
        .map_or(false, |id| !id.is_empty());
    if !has_id {
        fields.insert("id".to_string(), Value::String(generate_id(T::ID_PREFIX)));
    }
    if fields.get("createdAt").map_or(true, Value::is_null) {
        fields.insert("createdAt".to_string(), Value::String(now.to_rfc3339()));
    }
    fields.insert("updatedAt".to_string(), Value::String(now.to_rfc3339()));

    finish(Value::Object(fields))
}

/// Merge a partial JSON object over a stored record. The id cannot change.
pub fn merge_patch<T: Record>(
    existing: &T,
    patch: Value,
    now: DateTime<Utc>,
) -> Result<T, RecordError> {
    let patch = match patch {
        Value::Object(map) => map,
        _ => return Err(RecordError::NotObject { kind: T::KIND }),
    };

    let mut fields = match serde_json::to_value(existing) {
        Ok(Value::Object(map)) => map,
        _ => return Err(RecordError::NotObject { kind: T::KIND }),
    };

    for (key, value) in patch {
        if key != "id" {
            fields.insert(key, value);
        }
    }

    let mut record: T = finish(Value::Object(fields))?;
    record.set_updated_at(now);
    Ok(record)
}

fn finish<T: Record>(value: Value) -> Result<T, RecordError> {
    let mut record: T = serde_json::from_value(value).map_err(|e| RecordError::Invalid {
        kind: T::KIND,
        reason: e.to_string(),
    })?;

    record.normalize();
    record
        .validate()
        .map_err(|reason| RecordError::Invalid { kind: T::KIND, reason })?;

    Ok(record)
}

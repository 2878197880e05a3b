use crate::domain::tracker::TimeTracker;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use crate::infrastructure::tracker_codec::{deserialize_tracker, serialize_tracker};
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable key-value slots holding serialized trackers.
///
/// No coordination happens between writers: two processes sharing a slot
/// overwrite each other and the last write wins.
pub trait TrackerStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn write(&self, key: &str, value: &str) -> Result<(), InfraError>;
}

pub fn save_tracker(store: &dyn TrackerStore, tracker: &TimeTracker) -> Result<(), InfraError> {
    let value = serialize_tracker(tracker)?;
    store.write(tracker.storage_key(), &value)
}

/// `Ok(None)` when the slot is empty. Store failures and malformed records are both errors;
/// use [`decode_slot`] to tell them apart.
pub fn load_tracker(
    store: &dyn TrackerStore,
    key: &str,
) -> Result<Option<TimeTracker>, InfraError> {
    store
        .read(key)?
        .map(|raw| decode_slot(&raw, key))
        .transpose()
}

/// Decodes the raw contents of slot `key`. Only `Json`, `Domain` and `CorruptState` errors
/// come out of here.
pub fn decode_slot(raw: &str, key: &str) -> Result<TimeTracker, InfraError> {
    let tracker = deserialize_tracker(raw)?;
    if tracker.storage_key() != key.trim() {
        return Err(InfraError::CorruptState(format!(
            "slot '{}' holds tracker '{}'",
            key.trim(),
            tracker.storage_key()
        )));
    }
    Ok(tracker)
}

fn normalized_key(key: &str) -> Result<&str, InfraError> {
    let normalized = key.trim();
    if normalized.is_empty() {
        return Err(InfraError::InvalidConfig(
            "storage key must not be empty".to_string(),
        ));
    }
    Ok(normalized)
}

#[derive(Debug, Clone)]
pub struct SqliteTrackerStore {
    db_path: PathBuf,
}

impl SqliteTrackerStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

impl TrackerStore for SqliteTrackerStore {
    fn read(&self, key: &str) -> Result<Option<String>, InfraError> {
        let key = normalized_key(key)?;
        let connection = open_database(&self.db_path)?;
        let value = connection
            .query_row(
                "SELECT value FROM tracker_slots WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let key = normalized_key(key)?;
        let connection = open_database(&self.db_path)?;
        connection.execute(
            "INSERT INTO tracker_slots (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTrackerStore {
    slots: Mutex<HashMap<String, String>>,
}

impl TrackerStore for InMemoryTrackerStore {
    fn read(&self, key: &str) -> Result<Option<String>, InfraError> {
        let key = normalized_key(key)?;
        let slots = self
            .slots
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("tracker slots: {error}")))?;
        Ok(slots.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let key = normalized_key(key)?;
        let mut slots = self
            .slots
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("tracker slots: {error}")))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

//! Local key-value store: the device-side source of truth
//!
//! Writes are synchronous and visible to the next read in the same process.
//! Values are JSON; [`LocalStore::get`] never fails on malformed stored text,
//! it logs a diagnostic and reports the key as absent.

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;

use serde_json::Value;

use crate::error::Result;

/// Reserved prefix for sync bookkeeping; never exported or restored
pub const SYNC_STATE_PREFIX: &str = "__haven_sync__/";

/// Durable, synchronous, process-local key-value storage
pub trait LocalStore: Send + Sync {
    /// Raw stored text for `key`
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Store raw text under `key`, replacing any previous value
    fn set_raw(&self, key: &str, raw: &str) -> Result<()>;

    /// Delete `key`; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`; callers must not rely on ordering
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Decoded JSON value for `key`, or `None` if absent or malformed
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                tracing::warn!("Ignoring malformed value stored at '{}': {}", key, error);
                Ok(None)
            }
        }
    }

    /// Serialize `value` as JSON and store it under `key`
    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }
}

/// Application storage namespace: the key prefix owned by this app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNamespace(String);

impl StorageNamespace {
    pub const DEFAULT: &'static str = "haven:";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn prefix(&self) -> &str {
        &self.0
    }

    /// Full storage key for an app-level key
    pub fn key(&self, key: &str) -> String {
        format!("{}{key}", self.0)
    }

    /// Storage prefix of all records in `collection`
    pub fn collection_prefix(&self, collection: &str) -> String {
        format!("{}{collection}/", self.0)
    }

    /// Storage key of one record in `collection`
    pub fn record_key(&self, collection: &str, key: &str) -> String {
        format!("{}{collection}/{key}", self.0)
    }

    /// Whether `storage_key` belongs to this app and is not sync bookkeeping
    pub fn owns(&self, storage_key: &str) -> bool {
        storage_key.starts_with(&self.0) && !storage_key.starts_with(SYNC_STATE_PREFIX)
    }

    /// Storage key of the sync state of `collection`
    pub fn sync_state_key(&self, collection: &str) -> String {
        format!("{SYNC_STATE_PREFIX}{}{collection}", self.0)
    }
}

impl Default for StorageNamespace {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_nest_under_collection_prefix() {
        let namespace = StorageNamespace::default();
        let key = namespace.record_key("reminders", "reminder_1");
        assert_eq!(key, "haven:reminders/reminder_1");
        assert!(key.starts_with(&namespace.collection_prefix("reminders")));
        assert!(namespace.owns(&key));
    }

    #[test]
    fn sync_state_keys_are_outside_every_namespace() {
        let namespace = StorageNamespace::default();
        assert!(!namespace.owns(&namespace.sync_state_key("reminders")));

        let empty = StorageNamespace::new("");
        assert!(empty.owns("a"));
        assert!(!empty.owns(&empty.sync_state_key("reminders")));
    }
}

//! In-process remote store with switchable connectivity

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{require_owner, RemoteError, RemoteResult, RemoteStore, UpsertOutcome};
use crate::models::Record;

type RowKey = (String, String, String);

/// Remote store kept in memory, enforcing the same newer-wins rule as the
/// hosted backend. Connectivity and auth can be toggled to exercise the
/// offline and signed-out paths.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    rows: Mutex<HashMap<RowKey, Record>>,
    online: AtomicBool,
    authenticated: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            authenticated: AtomicBool::new(true),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Stored copy of one record
    pub fn get(&self, collection: &str, owner_id: &str, key: &str) -> Option<Record> {
        self.rows()
            .get(&(collection.to_string(), owner_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Overwrite a row unconditionally, as another device's write would land
    pub fn put(&self, collection: &str, record: Record) {
        let owner = record.owner.clone().unwrap_or_default();
        self.rows().insert(
            (collection.to_string(), owner, record.key.clone()),
            record,
        );
    }

    /// Number of stored rows across all collections, tombstones included
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upsert calls that reached the store (including rejected ones)
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<RowKey, Record>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reachable(&self) -> RemoteResult<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::NetworkUnavailable(
                "memory remote is offline".to_string(),
            ));
        }
        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthenticated);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_changed_since(
        &self,
        collection: &str,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Record>> {
        self.check_reachable()?;
        let mut records = self
            .rows()
            .iter()
            .filter(|((row_collection, row_owner, _), record)| {
                row_collection == collection && row_owner == owner_id && record.updated_at > since
            })
            .map(|(_, record)| record.clone())
            .collect::<Vec<_>>();
        records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.key.cmp(&b.key)));
        Ok(records)
    }

    async fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<UpsertOutcome> {
        self.check_reachable()?;
        let owner = require_owner(record)?.to_string();
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut stored = record.clone();
        if stored.deleted {
            stored.payload = serde_json::Value::Null;
        }

        let mut rows = self.rows();
        let row_key = (collection.to_string(), owner, record.key.clone());
        match rows.get(&row_key) {
            Some(existing) if existing.updated_at >= record.updated_at => {
                Ok(UpsertOutcome::Rejected(existing.clone()))
            }
            _ => {
                rows.insert(row_key, stored.clone());
                Ok(UpsertOutcome::Applied(stored))
            }
        }
    }

    async fn purge_tombstones(
        &self,
        collection: &str,
        owner_id: &str,
        older_than: DateTime<Utc>,
    ) -> RemoteResult<usize> {
        self.check_reachable()?;
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|(row_collection, row_owner, _), record| {
            !(row_collection == collection
                && row_owner == owner_id
                && record.deleted
                && record.updated_at < older_than)
        });
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(key: &str, ms: i64, payload: serde_json::Value) -> Record {
        Record {
            key: key.to_string(),
            payload,
            updated_at: Utc.timestamp_millis_opt(ms).unwrap(),
            deleted: false,
            owner: Some("user-1".to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_rejects_stale_and_equal_writes() {
        let remote = MemoryRemoteStore::new();
        let first = remote
            .upsert("reminders", &record("r1", 100, json!("v1")))
            .await
            .unwrap();
        assert!(first.is_applied());

        let stale = remote
            .upsert("reminders", &record("r1", 50, json!("old")))
            .await
            .unwrap();
        assert_eq!(stale, UpsertOutcome::Rejected(record("r1", 100, json!("v1"))));

        let tie = remote
            .upsert("reminders", &record("r1", 100, json!("same time")))
            .await
            .unwrap();
        assert!(!tie.is_applied());

        let newer = remote
            .upsert("reminders", &record("r1", 200, json!("v2")))
            .await
            .unwrap();
        assert!(newer.is_applied());
        assert_eq!(remote.upsert_calls(), 4);
    }

    #[tokio::test]
    async fn fetch_filters_by_owner_collection_and_time() {
        let remote = MemoryRemoteStore::new();
        remote.put("reminders", record("old", 10, json!(1)));
        remote.put("reminders", record("new", 30, json!(2)));
        remote.put("goals", record("goal", 40, json!(3)));
        let mut foreign = record("theirs", 50, json!(4));
        foreign.owner = Some("user-2".to_string());
        remote.put("reminders", foreign);

        let since = Utc.timestamp_millis_opt(20).unwrap();
        let changed = remote
            .fetch_changed_since("reminders", "user-1", since)
            .await
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].key, "new");
    }

    #[tokio::test]
    async fn offline_and_signed_out_are_reported() {
        let remote = MemoryRemoteStore::new();
        remote.set_online(false);
        let error = remote
            .upsert("reminders", &record("r1", 1, json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::NetworkUnavailable(_)));

        remote.set_online(true);
        remote.set_authenticated(false);
        let error = remote
            .fetch_changed_since("reminders", "user-1", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Unauthenticated));
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn delete_writes_tombstone_and_purge_removes_it() {
        let remote = MemoryRemoteStore::new();
        remote.put("reminders", record("r1", 10, json!("v1")));

        let outcome = remote
            .delete("reminders", "r1", "user-1", Utc.timestamp_millis_opt(20).unwrap())
            .await
            .unwrap();
        assert!(outcome.is_applied());
        assert!(outcome.stored().deleted);

        let purged = remote
            .purge_tombstones("reminders", "user-1", Utc.timestamp_millis_opt(21).unwrap())
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(remote.get("reminders", "user-1", "r1").is_none());
    }

    #[tokio::test]
    async fn upsert_requires_owner() {
        let remote = MemoryRemoteStore::new();
        let mut guest = record("r1", 1, json!(1));
        guest.owner = None;
        let error = remote.upsert("reminders", &guest).await.unwrap_err();
        assert!(matches!(error, RemoteError::InvalidRecord(_)));
    }
}

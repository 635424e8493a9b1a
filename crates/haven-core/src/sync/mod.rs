//! Sync coordinator: write-through saves and last-write-wins reconciliation
//!
//! Local writes land in the [`LocalStore`] synchronously and are then pushed
//! to the [`RemoteStore`] by a best-effort background task. [`SyncCoordinator::full_sync`]
//! reconciles a whole collection in both directions and reports what it did.

mod reconcile;
mod report;
mod retry;


pub use reconcile::{decide, SyncAction};
pub use report::{SyncOutcome, SyncReport, TombstonePurge};
pub use retry::RetryPolicy;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::auth::SessionHandle;
use crate::error::{Error, Result};
use crate::models::{Collection, CollectionPayload, Record, SyncState};
use crate::remote::{RemoteError, RemoteStore, UpsertOutcome};
use crate::store::{LocalStore, StorageNamespace, SYNC_STATE_PREFIX};
use crate::util::{now_millis, to_iso8601};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync cancelled")]
    Cancelled,
    #[error(transparent)]
    Local(#[from] Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub namespace: StorageNamespace,
    pub retry: RetryPolicy,
}

type PendingKey = (String, String);

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingWrites = Arc<Mutex<HashMap<PendingKey, PendingWrite>>>;

fn lock_pending(pending: &PendingWrites) -> MutexGuard<'_, HashMap<PendingKey, PendingWrite>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serializes read-modify-write cycles on record keys of one store
type WriteGuard = Arc<Mutex<()>>;

fn lock_writes(guard: &WriteGuard) -> MutexGuard<'_, ()> {
    guard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops in-flight write-throughs and any running sync pass.
///
/// Clonable so sign-out or app shutdown can cancel from another task.
#[derive(Clone)]
pub struct SyncCanceller {
    epoch: Arc<AtomicU64>,
    pending: PendingWrites,
}

impl SyncCanceller {
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let drained: Vec<PendingWrite> = lock_pending(&self.pending)
            .drain()
            .map(|(_, write)| write)
            .collect();
        if !drained.is_empty() {
            tracing::debug!("Aborting {} pending write-through(s)", drained.len());
        }
        for write in drained {
            write.handle.abort();
        }
    }
}

pub struct SyncCoordinator<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
    session: SessionHandle,
    options: SyncOptions,
    pending: PendingWrites,
    writes: WriteGuard,
    next_generation: AtomicU64,
    cancel_epoch: Arc<AtomicU64>,
}

impl<L, R> SyncCoordinator<L, R>
where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
{
    pub fn new(local: Arc<L>, remote: Arc<R>, session: SessionHandle, options: SyncOptions) -> Self {
        Self {
            local,
            remote,
            session,
            options,
            pending: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(Mutex::new(())),
            next_generation: AtomicU64::new(0),
            cancel_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub const fn namespace(&self) -> &StorageNamespace {
        &self.options.namespace
    }

    pub fn canceller(&self) -> SyncCanceller {
        SyncCanceller {
            epoch: Arc::clone(&self.cancel_epoch),
            pending: Arc::clone(&self.pending),
        }
    }

    /// Write a record locally and push it to the remote in the background.
    ///
    /// The local write is visible as soon as this returns. Remote failures
    /// are swallowed; the record is picked up by the next [`Self::full_sync`].
    pub fn save_local(&self, collection: &Collection, key: &str, payload: Value) -> Result<Record> {
        let key = validate_key(key)?;
        let storage_key = self.options.namespace.record_key(collection.as_str(), key);
        let record = {
            let _writes = lock_writes(&self.writes);
            let previous = load_record(self.local.as_ref(), &storage_key)?;
            let record =
                Record::new(key, payload, self.session.owner_id()).superseding(previous.as_ref());
            store_record(self.local.as_ref(), &storage_key, &record)?;
            record
        };
        self.write_through(collection, storage_key, record.clone());
        Ok(record)
    }

    /// Validate and save a typed payload; a fresh key is generated when `key` is `None`
    pub fn save_typed<T: CollectionPayload>(&self, key: Option<&str>, value: &T) -> Result<Record> {
        value.validate()?;
        let collection = Collection::new(T::COLLECTION)?;
        let key = key.map_or_else(Record::generate_key, str::to_string);
        self.save_local(&collection, &key, serde_json::to_value(value)?)
    }

    /// Tombstone a record locally and propagate the deletion in the background
    pub fn delete_local(&self, collection: &Collection, key: &str) -> Result<Record> {
        let key = validate_key(key)?;
        let storage_key = self.options.namespace.record_key(collection.as_str(), key);
        let tombstone = {
            let _writes = lock_writes(&self.writes);
            let previous = load_record(self.local.as_ref(), &storage_key)?;
            let tombstone = Record::tombstone(key, now_millis(), self.session.owner_id())
                .superseding(previous.as_ref());
            store_record(self.local.as_ref(), &storage_key, &tombstone)?;
            tombstone
        };
        self.write_through(collection, storage_key, tombstone.clone());
        Ok(tombstone)
    }

    /// Live record for `key`; tombstones read as absent
    pub fn get(&self, collection: &Collection, key: &str) -> Result<Option<Record>> {
        let storage_key = self.options.namespace.record_key(collection.as_str(), key);
        Ok(load_record(self.local.as_ref(), &storage_key)?.filter(|record| !record.deleted))
    }

    pub fn get_typed<T: CollectionPayload>(&self, key: &str) -> Result<Option<T>> {
        let collection = Collection::new(T::COLLECTION)?;
        match self.get(&collection, key)? {
            Some(record) => Ok(Some(serde_json::from_value(record.payload)?)),
            None => Ok(None),
        }
    }

    /// Live records of `collection`, ordered by key
    pub fn list(&self, collection: &Collection) -> Result<Vec<Record>> {
        Ok(self
            .local_records(collection)?
            .into_values()
            .filter(|record| !record.deleted)
            .collect())
    }

    /// Live records decoded as `T`; records that no longer match the schema are skipped
    pub fn list_typed<T: CollectionPayload>(&self) -> Result<Vec<(String, T)>> {
        let collection = Collection::new(T::COLLECTION)?;
        let mut items = Vec::new();
        for record in self.list(&collection)? {
            match serde_json::from_value::<T>(record.payload) {
                Ok(value) => items.push((record.key, value)),
                Err(error) => {
                    tracing::warn!("Skipping '{}/{}': {}", collection, record.key, error);
                }
            }
        }
        Ok(items)
    }

    pub fn sync_state(&self, collection: &Collection) -> Result<SyncState> {
        let storage_key = self.options.namespace.sync_state_key(collection.as_str());
        let Some(value) = self.local.get(&storage_key)? else {
            return Ok(SyncState::new(collection.clone()));
        };
        match serde_json::from_value::<SyncState>(value) {
            Ok(state) => Ok(state),
            Err(error) => {
                tracing::warn!("Resetting unreadable sync state for '{}': {}", collection, error);
                Ok(SyncState::new(collection.clone()))
            }
        }
    }

    /// Forget when `collection` was last synced; the next pass re-scans from epoch
    pub fn reset_sync_state(&self, collection: &Collection) -> Result<()> {
        let storage_key = self.options.namespace.sync_state_key(collection.as_str());
        self.local.remove(&storage_key)
    }

    /// Cancel pending work, drop the session, and reset every sync state.
    ///
    /// Local records stay on the device.
    pub fn sign_out(&self) -> Result<usize> {
        self.cancel();
        self.session.clear();

        let prefix = format!("{SYNC_STATE_PREFIX}{}", self.options.namespace.prefix());
        let keys = self.local.keys_with_prefix(&prefix)?;
        for key in &keys {
            self.local.remove(key)?;
        }
        tracing::info!("Signed out; reset sync state of {} collection(s)", keys.len());
        Ok(keys.len())
    }

    /// Abort in-flight write-throughs and stop running sync passes
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Wait for every in-flight write-through to finish
    pub async fn flush(&self) {
        loop {
            let drained: Vec<PendingWrite> = lock_pending(&self.pending)
                .drain()
                .map(|(_, write)| write)
                .collect();
            if drained.is_empty() {
                return;
            }
            for write in drained {
                if let Err(error) = write.handle.await {
                    if !error.is_cancelled() {
                        tracing::warn!("Write-through task failed: {}", error);
                    }
                }
            }
        }
    }

    /// Give ownerless local records in `collection` to the signed-in user.
    ///
    /// Timestamps are kept, so adopted records still lose to newer remote
    /// copies on the next sync.
    pub fn adopt_guest_records(&self, collection: &Collection) -> Result<usize> {
        let Some(owner) = self.session.owner_id() else {
            return Err(Error::InvalidInput(
                "Sign in before adopting guest records".to_string(),
            ));
        };

        let mut adopted = 0;
        let _writes = lock_writes(&self.writes);
        for (key, mut record) in self.local_records(collection)? {
            if record.owner.is_some() {
                continue;
            }
            record.owner = Some(owner.clone());
            let storage_key = self.options.namespace.record_key(collection.as_str(), &key);
            store_record(self.local.as_ref(), &storage_key, &record)?;
            adopted += 1;
        }

        if adopted > 0 {
            tracing::info!("Adopted {} guest record(s) in '{}'", adopted, collection);
        }
        Ok(adopted)
    }

    /// Physically delete tombstones older than `retention`.
    ///
    /// Guest tombstones only need to age out. Owned tombstones must also be
    /// covered by the last completed sync pass, so the remote has seen them.
    pub async fn purge_tombstones(
        &self,
        collection: &Collection,
        retention: Duration,
    ) -> Result<TombstonePurge> {
        let cutoff = now_millis() - retention;
        let owner = self.session.owner_id();
        let synced_until = self.sync_state(collection)?.last_sync_at;
        let confirmed_before = synced_until.map_or(cutoff, |synced| synced.min(cutoff));

        let mut purge = TombstonePurge::new(collection.as_str());
        for (key, record) in self.local_records(collection)? {
            if !record.deleted || record.updated_at >= cutoff {
                continue;
            }
            let eligible = match (&record.owner, &owner) {
                (None, _) => true,
                (Some(record_owner), Some(owner)) => {
                    record_owner == owner
                        && synced_until.is_some_and(|synced| record.updated_at <= synced)
                }
                (Some(_), None) => false,
            };
            if eligible {
                let storage_key = self.options.namespace.record_key(collection.as_str(), &key);
                self.local.remove(&storage_key)?;
                purge.local_purged += 1;
            }
        }

        if let (Some(owner), Some(_)) = (owner, synced_until) {
            match self
                .remote
                .purge_tombstones(collection.as_str(), &owner, confirmed_before)
                .await
            {
                Ok(count) => purge.remote_purged = Some(count),
                Err(RemoteError::Unauthenticated) => {
                    tracing::debug!("Skipping remote tombstone purge: not signed in");
                }
                Err(error) => {
                    tracing::warn!("Remote tombstone purge for '{}' failed: {}", collection, error);
                }
            }
        }

        tracing::info!(
            "Purged {} local tombstone(s) from '{}' older than {}",
            purge.local_purged,
            collection,
            to_iso8601(cutoff)
        );
        Ok(purge)
    }

    /// Reconcile `collection` with the remote store in both directions.
    ///
    /// Remote failures never surface as errors: they are counted in the
    /// report, and `lastSyncAt` only advances when every key reconciled.
    pub async fn full_sync(&self, collection: &Collection) -> SyncResult<SyncReport> {
        let name = collection.as_str();
        let Some(owner) = self.session.owner_id() else {
            tracing::debug!("Guest mode: skipping sync of '{}'", name);
            return Ok(SyncReport::new(name, SyncOutcome::GuestMode));
        };

        let epoch = self.cancel_epoch.load(Ordering::SeqCst);
        let state = self.sync_state(collection)?;
        let started_at = now_millis();
        let local_records = self.local_records(collection)?;

        let fetched = self
            .options
            .retry
            .run("fetch", || {
                self.remote
                    .fetch_changed_since(name, &owner, state.since())
            })
            .await;
        let remote_records: BTreeMap<String, Record> = match fetched {
            Ok(records) => records
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
            Err(error) => {
                if matches!(error, RemoteError::Unauthenticated) {
                    tracing::debug!("Sync of '{}' deferred: not signed in", name);
                } else {
                    tracing::warn!("Sync of '{}' deferred: {}", name, error);
                }
                return Ok(SyncReport::new(name, SyncOutcome::Deferred(error.to_string())));
            }
        };
        self.check_cancelled(epoch)?;

        tracing::debug!(
            "Reconciling '{}': {} local, {} remote changed since {}",
            name,
            local_records.len(),
            remote_records.len(),
            to_iso8601(state.since())
        );

        let keys: BTreeSet<&String> = local_records.keys().chain(remote_records.keys()).collect();
        let mut report = SyncReport::new(name, SyncOutcome::Completed);
        let mut remote_halted = false;

        for key in keys {
            self.check_cancelled(epoch)?;

            let local = local_records.get(key);
            if local.is_some_and(|record| !record.is_owned_by(&owner)) {
                report.skipped += 1;
                continue;
            }
            let remote = remote_records.get(key);

            match decide(local, remote) {
                SyncAction::Unchanged => report.unchanged += 1,
                SyncAction::Pull | SyncAction::PullTombstone => {
                    if let Some(remote) = remote {
                        self.apply_pulled(collection, remote, &owner, &mut report);
                    }
                }
                SyncAction::Push | SyncAction::PushTombstone => {
                    let Some(local) = local else { continue };
                    if remote_halted {
                        report.failed += 1;
                        continue;
                    }
                    match self.push(name, local, &owner).await {
                        Ok(UpsertOutcome::Applied(_)) => {
                            if local.deleted {
                                report.tombstoned += 1;
                            } else {
                                report.pushed += 1;
                            }
                        }
                        Ok(UpsertOutcome::Rejected(stored)) => {
                            if remote_wins(local, &stored) {
                                self.apply_pulled(collection, &stored, &owner, &mut report);
                            } else {
                                report.unchanged += 1;
                            }
                        }
                        Err(error) => {
                            report.failed += 1;
                            if retry::stops_remote_writes(&error) {
                                tracing::warn!(
                                    "Stopping remote writes for '{}' this pass: {}",
                                    name,
                                    error
                                );
                                remote_halted = true;
                            } else {
                                tracing::warn!("Failed to push '{}/{}': {}", name, key, error);
                            }
                        }
                    }
                }
            }
        }

        self.check_cancelled(epoch)?;
        if report.failed == 0 {
            self.advance_sync_state(collection, started_at)?;
        } else {
            report.outcome = SyncOutcome::Partial;
        }

        tracing::info!("{}", report);
        Ok(report)
    }

    /// Sync several collections in order, stopping only on cancellation or a local failure
    pub async fn sync_all(
        &self,
        collections: &[Collection],
    ) -> SyncResult<Vec<SyncReport>> {
        let mut reports = Vec::with_capacity(collections.len());
        for collection in collections {
            reports.push(self.full_sync(collection).await?);
        }
        Ok(reports)
    }

    fn check_cancelled(&self, epoch: u64) -> SyncResult<()> {
        if self.cancel_epoch.load(Ordering::SeqCst) == epoch {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    async fn push(
        &self,
        collection: &str,
        local: &Record,
        owner: &str,
    ) -> crate::remote::RemoteResult<UpsertOutcome> {
        let label = format!("push {collection}/{}", local.key);
        if local.deleted {
            self.options
                .retry
                .run(&label, || {
                    self.remote
                        .delete(collection, &local.key, owner, local.updated_at)
                })
                .await
        } else {
            self.options
                .retry
                .run(&label, || self.remote.upsert(collection, local))
                .await
        }
    }

    /// Store a pulled remote copy unless the local record changed since the
    /// snapshot and now beats it
    fn apply_pulled(
        &self,
        collection: &Collection,
        remote: &Record,
        owner: &str,
        report: &mut SyncReport,
    ) {
        let mut record = remote.clone();
        record.owner = Some(owner.to_string());
        if record.deleted {
            record.payload = Value::Null;
        }

        let storage_key = self
            .options
            .namespace
            .record_key(collection.as_str(), &record.key);
        let _writes = lock_writes(&self.writes);
        let stored = load_record(self.local.as_ref(), &storage_key).and_then(|current| {
            if current
                .as_ref()
                .is_some_and(|current| !remote_wins(current, &record))
            {
                return Ok(false);
            }
            store_record(self.local.as_ref(), &storage_key, &record).map(|()| true)
        });
        match stored {
            Ok(false) => {
                tracing::debug!(
                    "Keeping local '{}': pulled copy from {} no longer wins",
                    storage_key,
                    to_iso8601(record.updated_at)
                );
                report.unchanged += 1;
            }
            Ok(true) if record.deleted => report.tombstoned += 1,
            Ok(true) => report.pulled += 1,
            Err(error) => {
                tracing::warn!("Failed to store pulled record '{}': {}", storage_key, error);
                report.failed += 1;
            }
        }
    }

    fn advance_sync_state(&self, collection: &Collection, started_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.sync_state(collection)?;
        if state.last_sync_at.is_some_and(|last| last >= started_at) {
            return Ok(());
        }
        state.last_sync_at = Some(started_at);
        let storage_key = self.options.namespace.sync_state_key(collection.as_str());
        self.local.set(&storage_key, &serde_json::to_value(&state)?)
    }

    /// Every local record of `collection`, tombstones included, keyed by record key
    fn local_records(&self, collection: &Collection) -> Result<BTreeMap<String, Record>> {
        let prefix = self.options.namespace.collection_prefix(collection.as_str());
        let mut records = BTreeMap::new();
        for storage_key in self.local.keys_with_prefix(&prefix)? {
            let Some(key) = storage_key.strip_prefix(&prefix) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            if let Some(mut record) = load_record(self.local.as_ref(), &storage_key)? {
                record.key = key.to_string();
                records.insert(key.to_string(), record);
            }
        }
        Ok(records)
    }

    fn write_through(&self, collection: &Collection, storage_key: String, record: Record) {
        if record.owner.is_none() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(
                "No async runtime; '{}' will be pushed on the next sync",
                storage_key
            );
            return;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let pending_key = (collection.to_string(), record.key.clone());
        let task = WriteThrough {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            pending: Arc::clone(&self.pending),
            writes: Arc::clone(&self.writes),
            pending_key: pending_key.clone(),
            generation,
            collection: collection.to_string(),
            storage_key,
            record,
        };

        let mut pending = lock_pending(&self.pending);
        let handle = runtime.spawn(task.run());
        if let Some(superseded) = pending.insert(pending_key, PendingWrite { generation, handle }) {
            superseded.handle.abort();
        }
    }
}

/// One best-effort remote write for a local save
struct WriteThrough<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
    pending: PendingWrites,
    writes: WriteGuard,
    pending_key: PendingKey,
    generation: u64,
    collection: String,
    storage_key: String,
    record: Record,
}

impl<L: LocalStore, R: RemoteStore> WriteThrough<L, R> {
    async fn run(self) {
        let result = match (&self.record.owner, self.record.deleted) {
            (Some(owner), true) => {
                self.remote
                    .delete(
                        &self.collection,
                        &self.record.key,
                        owner,
                        self.record.updated_at,
                    )
                    .await
            }
            _ => self.remote.upsert(&self.collection, &self.record).await,
        };

        match result {
            Ok(UpsertOutcome::Applied(_)) => {
                tracing::debug!("Pushed '{}'", self.storage_key);
            }
            Ok(UpsertOutcome::Rejected(stored)) => {
                let pulled = {
                    let _writes = lock_writes(&self.writes);
                    pull_if_newer(self.local.as_ref(), &self.storage_key, &stored)
                };
                if let Err(error) = pulled {
                    tracing::warn!(
                        "Failed to pull newer remote copy of '{}': {}",
                        self.storage_key,
                        error
                    );
                }
            }
            Err(RemoteError::Unauthenticated) => {
                tracing::debug!("Not signed in; '{}' stays local for now", self.storage_key);
            }
            Err(error @ RemoteError::NetworkUnavailable(_)) => {
                tracing::debug!("Deferring '{}' to next sync: {}", self.storage_key, error);
            }
            Err(error) => {
                tracing::warn!("Write-through of '{}' failed: {}", self.storage_key, error);
            }
        }

        let mut pending = lock_pending(&self.pending);
        if pending
            .get(&self.pending_key)
            .is_some_and(|write| write.generation == self.generation)
        {
            pending.remove(&self.pending_key);
        }
    }
}

/// Replace the local copy with `stored` when the remote one wins
fn pull_if_newer<L: LocalStore + ?Sized>(local: &L, storage_key: &str, stored: &Record) -> Result<bool> {
    let current = load_record(local, storage_key)?;
    let replace = current
        .as_ref()
        .map_or(true, |current| remote_wins(current, stored));
    if replace {
        tracing::debug!(
            "Remote kept a newer copy of '{}' ({}); pulling it down",
            storage_key,
            to_iso8601(stored.updated_at)
        );
        store_record(local, storage_key, stored)?;
    }
    Ok(replace)
}

/// Whether a stored remote copy beats the local one: strictly newer, or a
/// different version at the same instant
fn remote_wins(local: &Record, remote: &Record) -> bool {
    remote.updated_at > local.updated_at
        || (remote.updated_at == local.updated_at && !local.same_version(remote))
}

pub(crate) fn load_record<L: LocalStore + ?Sized>(local: &L, storage_key: &str) -> Result<Option<Record>> {
    let Some(value) = local.get(storage_key)? else {
        return Ok(None);
    };
    match serde_json::from_value::<Record>(value) {
        Ok(record) => Ok(Some(record)),
        Err(error) => {
            tracing::warn!("Ignoring malformed record at '{}': {}", storage_key, error);
            Ok(None)
        }
    }
}

pub(crate) fn store_record<L: LocalStore + ?Sized>(local: &L, storage_key: &str, record: &Record) -> Result<()> {
    local.set(storage_key, &serde_json::to_value(record)?)
}

fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        Err(Error::InvalidInput("Record key must not be empty".to_string()))
    } else {
        Ok(key)
    }
}

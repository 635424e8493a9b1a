//! Remote store adapter: the hosted backup and cross-device distribution point
//!
//! The sync coordinator only talks to the backend through [`RemoteStore`].
//! Adapters never retry; retry policy belongs to the caller.

mod memory;
mod supabase;

pub use memory::MemoryRemoteStore;
pub use supabase::{SupabaseRemoteConfig, SupabaseRemoteStore, DEFAULT_RECORDS_TABLE};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Record;

/// Errors raised by remote store adapters
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No valid session; expected in guest mode, not logged as an error
    #[error("Not signed in")]
    Unauthenticated,
    /// Offline, unreachable, or timed out
    #[error("Remote store unavailable: {0}")]
    NetworkUnavailable(String),
    /// The backend answered with an error status
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    /// The backend answered with something we could not decode
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    /// The record cannot be written remotely (e.g. it has no owner)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl RemoteError {
    /// Whether the operation can simply be deferred to the next sync pass
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::NetworkUnavailable(_))
    }

    /// Worth retrying within the same pass
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            Self::NetworkUnavailable(error.to_string())
        } else if error.is_decode() {
            Self::InvalidPayload(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Api {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::NetworkUnavailable(error.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result of a conditional remote write
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The write was strictly newer and is now stored
    Applied(Record),
    /// A copy at least as new already existed; carries the stored copy
    Rejected(Record),
}

impl UpsertOutcome {
    /// The record the remote side holds after the call
    pub const fn stored(&self) -> &Record {
        match self {
            Self::Applied(record) | Self::Rejected(record) => record,
        }
    }

    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Owner-scoped access to the remote copy of every collection
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Records in `collection` owned by `owner_id` with `updated_at > since`,
    /// tombstones included
    async fn fetch_changed_since(
        &self,
        collection: &str,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Record>>;

    /// Write `record` unless the stored copy is at least as new
    async fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<UpsertOutcome>;

    /// Tombstone `key` at `deleted_at`, under the same newer-wins rule as `upsert`
    async fn delete(
        &self,
        collection: &str,
        key: &str,
        owner_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> RemoteResult<UpsertOutcome> {
        let tombstone = Record::tombstone(key, deleted_at, Some(owner_id.to_string()));
        self.upsert(collection, &tombstone).await
    }

    /// Physically remove tombstones last updated before `older_than`
    async fn purge_tombstones(
        &self,
        collection: &str,
        owner_id: &str,
        older_than: DateTime<Utc>,
    ) -> RemoteResult<usize>;
}

pub(crate) fn require_owner(record: &Record) -> RemoteResult<&str> {
    record
        .owner
        .as_deref()
        .filter(|owner| !owner.trim().is_empty())
        .ok_or_else(|| {
            RemoteError::InvalidRecord(format!("record '{}' has no owner", record.key))
        })
}

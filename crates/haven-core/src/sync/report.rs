//! Aggregate result of a sync pass

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every key reconciled; `lastSyncAt` advanced
    Completed,
    /// Some keys failed; `lastSyncAt` left unchanged
    Partial,
    /// The remote could not be reached or refused the session
    Deferred(String),
    /// No signed-in owner, nothing to do
    GuestMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub collection: String,
    pub outcome: SyncOutcome,
    pub pushed: usize,
    pub pulled: usize,
    pub tombstoned: usize,
    pub unchanged: usize,
    /// Local records that belong to another owner or to guest mode
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn new(collection: impl Into<String>, outcome: SyncOutcome) -> Self {
        Self {
            collection: collection.into(),
            outcome,
            pushed: 0,
            pulled: 0,
            tombstoned: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Keys whose content changed on either side
    pub const fn changes(&self) -> usize {
        self.pushed + self.pulled + self.tombstoned
    }

    pub const fn is_complete(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Completed | SyncOutcome::GuestMode)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.outcome {
            SyncOutcome::Completed => "completed".to_string(),
            SyncOutcome::Partial => "partial".to_string(),
            SyncOutcome::Deferred(reason) => format!("deferred ({reason})"),
            SyncOutcome::GuestMode => "guest mode, local only".to_string(),
        };
        write!(
            f,
            "{}: {} | pushed {}, pulled {}, tombstoned {}, unchanged {}, skipped {}, failed {}",
            self.collection,
            status,
            self.pushed,
            self.pulled,
            self.tombstoned,
            self.unchanged,
            self.skipped,
            self.failed
        )
    }
}

/// Result of a tombstone garbage-collection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TombstonePurge {
    pub collection: String,
    pub local_purged: usize,
    /// `None` when the remote side was not purged (guest mode, never synced, or offline)
    pub remote_purged: Option<usize>,
}

impl TombstonePurge {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            local_purged: 0,
            remote_purged: None,
        }
    }
}

impl fmt::Display for TombstonePurge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_purged {
            Some(remote) => write!(
                f,
                "{}: purged {} local and {} remote tombstone(s)",
                self.collection, self.local_purged, remote
            ),
            None => write!(
                f,
                "{}: purged {} local tombstone(s), remote untouched",
                self.collection, self.local_purged
            ),
        }
    }
}

//! Per-record last-write-wins arbitration

use crate::models::Record;

/// What a sync pass does with one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Local copy wins; upload it
    Push,
    /// Remote copy wins; write it locally
    Pull,
    /// Local tombstone wins; tombstone the remote copy
    PushTombstone,
    /// Remote tombstone wins; tombstone the local copy
    PullTombstone,
    /// Both sides already agree
    Unchanged,
}

/// Decide how to reconcile one key.
///
/// The strictly newer side wins; on an exact timestamp tie the remote copy
/// wins unless both sides already hold the same version. A winning tombstone
/// is propagated as a tombstone, never as a payload.
pub fn decide(local: Option<&Record>, remote: Option<&Record>) -> SyncAction {
    match (local, remote) {
        (None, None) => SyncAction::Unchanged,
        (Some(local), None) => push(local),
        (None, Some(remote)) => pull(remote),
        (Some(local), Some(remote)) => {
            if local.same_version(remote) {
                SyncAction::Unchanged
            } else if local.updated_at > remote.updated_at {
                push(local)
            } else {
                pull(remote)
            }
        }
    }
}

const fn push(local: &Record) -> SyncAction {
    if local.deleted {
        SyncAction::PushTombstone
    } else {
        SyncAction::Push
    }
}

const fn pull(remote: &Record) -> SyncAction {
    if remote.deleted {
        SyncAction::PullTombstone
    } else {
        SyncAction::Pull
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn live(ms: i64, payload: Value) -> Record {
        Record {
            key: "k".to_string(),
            payload,
            updated_at: Utc.timestamp_millis_opt(ms).unwrap(),
            deleted: false,
            owner: Some("user".to_string()),
        }
    }

    fn tombstone(ms: i64) -> Record {
        Record::tombstone(
            "k",
            Utc.timestamp_millis_opt(ms).unwrap(),
            Some("user".to_string()),
        )
    }

    #[test]
    fn one_sided_keys_move_to_the_other_side() {
        assert_eq!(decide(Some(&live(1, json!(1))), None), SyncAction::Push);
        assert_eq!(decide(None, Some(&live(1, json!(1)))), SyncAction::Pull);
        assert_eq!(decide(Some(&tombstone(1)), None), SyncAction::PushTombstone);
        assert_eq!(decide(None, Some(&tombstone(1))), SyncAction::PullTombstone);
    }

    #[test]
    fn newer_side_wins() {
        let old = live(100, json!("old"));
        let new = live(200, json!("new"));
        assert_eq!(decide(Some(&new), Some(&old)), SyncAction::Push);
        assert_eq!(decide(Some(&old), Some(&new)), SyncAction::Pull);
    }

    #[test]
    fn tie_prefers_remote() {
        let local = live(100, json!("local"));
        let remote = live(100, json!("remote"));
        assert_eq!(decide(Some(&local), Some(&remote)), SyncAction::Pull);
    }

    #[test]
    fn identical_versions_are_unchanged() {
        let record = live(100, json!({"title": "Take medicine"}));
        assert_eq!(decide(Some(&record), Some(&record.clone())), SyncAction::Unchanged);
        assert_eq!(decide(Some(&tombstone(5)), Some(&tombstone(5))), SyncAction::Unchanged);
    }

    #[test]
    fn newer_local_tombstone_is_not_resurrected() {
        let local = tombstone(300);
        let remote = live(200, json!("stale"));
        assert_eq!(decide(Some(&local), Some(&remote)), SyncAction::PushTombstone);
    }

    #[test]
    fn newer_remote_tombstone_wins() {
        let local = live(100, json!("doomed"));
        assert_eq!(decide(Some(&local), Some(&tombstone(150))), SyncAction::PullTombstone);
    }
}

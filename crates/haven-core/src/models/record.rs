//! Record model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::now_millis;

/// The unit of synchronization: one user-authored value in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier, unique within its collection
    pub key: String,
    /// Opaque user content (`null` for tombstones)
    #[serde(default)]
    pub payload: Value,
    /// Last modification time, set by whichever side performed the write
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    /// Authenticated owner; `None` for guest-mode records that never sync
    #[serde(default)]
    pub owner: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl Record {
    /// Create a live record stamped with the current time
    pub fn new(key: impl Into<String>, payload: Value, owner: Option<String>) -> Self {
        Self {
            key: key.into(),
            payload,
            updated_at: now_millis(),
            deleted: false,
            owner,
        }
    }

    /// Create a tombstone for `key` at the given time
    pub fn tombstone(
        key: impl Into<String>,
        deleted_at: DateTime<Utc>,
        owner: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            payload: Value::Null,
            updated_at: deleted_at,
            deleted: true,
            owner,
        }
    }

    /// Generate a fresh time-sortable record key (UUID v7)
    #[must_use]
    pub fn generate_key() -> String {
        Uuid::now_v7().to_string()
    }

    /// Set `updated_at` so this version strictly supersedes `previous`.
    ///
    /// Keeps local writes ordered even when the wall clock stalls or steps back.
    #[must_use]
    pub fn superseding(mut self, previous: Option<&Self>) -> Self {
        if let Some(previous) = previous {
            if self.updated_at <= previous.updated_at {
                self.updated_at = previous.updated_at + Duration::milliseconds(1);
            }
        }
        self
    }

    /// Same version on both sides: timestamp, tombstone flag, and payload agree
    pub fn same_version(&self, other: &Self) -> bool {
        self.updated_at == other.updated_at
            && self.deleted == other.deleted
            && (self.deleted || self.payload == other.payload)
    }

    /// Whether this record belongs to `owner`
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_record_new_is_live() {
        let record = Record::new("btn-1", json!({"label": "Eat"}), None);
        assert!(!record.deleted);
        assert_eq!(record.owner, None);
        assert_eq!(record.updated_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_tombstone_drops_payload() {
        let record = Record::tombstone("btn-1", at(5), Some("user".into()));
        assert!(record.deleted);
        assert_eq!(record.payload, Value::Null);
        assert_eq!(record.updated_at, at(5));
    }

    #[test]
    fn test_superseding_bumps_stale_timestamp() {
        let previous = Record {
            updated_at: at(2_000),
            ..Record::new("k", json!(1), None)
        };
        let next = Record {
            updated_at: at(1_000),
            ..Record::new("k", json!(2), None)
        }
        .superseding(Some(&previous));
        assert_eq!(next.updated_at, at(2_001));
    }

    #[test]
    fn test_superseding_keeps_newer_timestamp() {
        let previous = Record {
            updated_at: at(1_000),
            ..Record::new("k", json!(1), None)
        };
        let next = Record {
            updated_at: at(3_000),
            ..Record::new("k", json!(2), None)
        }
        .superseding(Some(&previous));
        assert_eq!(next.updated_at, at(3_000));
    }

    #[test]
    fn test_envelope_uses_camel_case() {
        let record = Record {
            updated_at: at(0),
            ..Record::new("reminder_1", json!({"title": "Take medicine"}), None)
        };
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(
            encoded,
            json!({
                "key": "reminder_1",
                "payload": {"title": "Take medicine"},
                "updatedAt": "1970-01-01T00:00:00Z",
                "owner": null
            })
        );
    }

    #[test]
    fn test_same_version_ignores_payload_of_tombstones() {
        let a = Record::tombstone("k", at(10), None);
        let mut b = a.clone();
        b.payload = json!("leftover");
        assert!(a.same_version(&b));
    }

    #[test]
    fn test_generate_key_is_unique() {
        assert_ne!(Record::generate_key(), Record::generate_key());
    }
}

//! Reminder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::{require_text, CollectionPayload};
use crate::error::Result;

/// A reminder the user (or a caregiver) set up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When the reminder should fire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl Reminder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: None,
            due_at: None,
            completed: false,
        }
    }

    /// Due and not yet completed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_at.is_some_and(|due_at| due_at <= now)
    }
}

impl CollectionPayload for Reminder {
    const COLLECTION: &'static str = "reminders";

    fn validate(&self) -> Result<()> {
        require_text(&self.title, "title")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut reminder = Reminder::new("Take medicine");
        assert!(!reminder.is_due(now));

        reminder.due_at = Some(now - Duration::minutes(1));
        assert!(reminder.is_due(now));

        reminder.completed = true;
        assert!(!reminder.is_due(now));
    }

    #[test]
    fn test_deserialize_minimal() {
        let reminder: Reminder = serde_json::from_str(r#"{"title":"Take medicine"}"#).unwrap();
        assert_eq!(reminder, Reminder::new("Take medicine"));
    }
}

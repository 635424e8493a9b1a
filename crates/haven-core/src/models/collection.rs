//! Collection and per-collection sync bookkeeping

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::epoch;

/// A named group of records sharing a schema and a storage key prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Collection(String);

impl Collection {
    pub const AAC_BUTTONS: &'static str = "aac_buttons";
    pub const PUSH_SUBSCRIPTIONS: &'static str = "push_subscriptions";
    pub const REMINDERS: &'static str = "reminders";
    pub const GOALS: &'static str = "goals";
    pub const NOTES: &'static str = "notes";
    pub const COUNTERS: &'static str = "counters";

    /// Create a collection, validating its name
    ///
    /// Valid names match `^[a-z][a-z0-9_-]*$` so they are safe inside storage
    /// keys and remote query filters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if collection_name_pattern().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidInput(format!(
                "Invalid collection name '{name}' (expected lowercase letters, digits, '_' or '-')"
            )))
        }
    }

    /// Collections the app knows about out of the box
    pub fn well_known() -> Vec<Self> {
        [
            Self::AAC_BUTTONS,
            Self::PUSH_SUBSCRIPTIONS,
            Self::REMINDERS,
            Self::GOALS,
            Self::NOTES,
            Self::COUNTERS,
        ]
        .into_iter()
        .map(|name| Self(name.to_string()))
        .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn collection_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("Invalid regex"))
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Collection {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Collection> for String {
    fn from(value: Collection) -> Self {
        value.0
    }
}

/// Per-collection, per-device record of the last successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub collection: Collection,
    /// Start time of the last pass that reconciled every record
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            last_sync_at: None,
        }
    }

    /// Lower bound for the next incremental fetch (epoch if never synced)
    pub fn since(&self) -> DateTime<Utc> {
        self.last_sync_at.unwrap_or_else(epoch)
    }
}

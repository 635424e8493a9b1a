//! Runtime configuration shared by every Haven front end.
//!
//! Only public values live here: the Supabase URL and anon key are safe to
//! ship. Session tokens are kept by the auth layer, never in this file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Collection;
use crate::remote::{SupabaseRemoteConfig, DEFAULT_RECORDS_TABLE};
use crate::store::StorageNamespace;
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_APP_NAME: &str = "haven";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 12;
pub const DEFAULT_TOMBSTONE_RETENTION_DAYS: u32 = 30;
const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60;

pub const ENV_SUPABASE_URL: &str = "HAVEN_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "HAVEN_SUPABASE_ANON_KEY";
pub const ENV_APP_NAME: &str = "HAVEN_APP_NAME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HavenConfig {
    /// Identifier stamped into backups; imports from other apps are refused
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_storage_namespace")]
    pub storage_namespace: String,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default = "default_records_table")]
    pub records_table: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tombstone_retention_days")]
    pub tombstone_retention_days: u32,
    /// Collections synced when none are named explicitly
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_storage_namespace() -> String {
    StorageNamespace::DEFAULT.to_string()
}

fn default_records_table() -> String {
    DEFAULT_RECORDS_TABLE.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_tombstone_retention_days() -> u32 {
    DEFAULT_TOMBSTONE_RETENTION_DAYS
}

fn default_collections() -> Vec<String> {
    Collection::well_known()
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for HavenConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            storage_namespace: default_storage_namespace(),
            supabase_url: None,
            supabase_anon_key: None,
            records_table: default_records_table(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tombstone_retention_days: DEFAULT_TOMBSTONE_RETENTION_DAYS,
            collections: default_collections(),
        }
    }
}

impl HavenConfig {
    /// Parse and validate a JSON config document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|error| Error::InvalidInput(format!("invalid config: {error}")))?;
        config.normalized()
    }

    /// Override fields from environment-style variables
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_SUPABASE_URL)) {
            self.supabase_url = Some(url);
        }
        if let Some(anon_key) = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)) {
            self.supabase_anon_key = Some(anon_key);
        }
        if let Some(app_name) = normalize_text_option(lookup(ENV_APP_NAME)) {
            self.app_name = app_name;
        }
        self
    }

    /// Trim text, drop empty optionals, and check cross-field rules
    pub fn normalized(mut self) -> Result<Self> {
        self.app_name = self.app_name.trim().to_string();
        if self.app_name.is_empty() {
            return Err(Error::InvalidInput("app_name must not be empty".to_string()));
        }
        self.records_table = self.records_table.trim().to_string();
        if self.records_table.is_empty() {
            return Err(Error::InvalidInput(
                "records_table must not be empty".to_string(),
            ));
        }

        self.supabase_url = normalize_text_option(self.supabase_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
        if let Some(url) = &self.supabase_url {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        self.supabase()?;

        self.request_timeout_secs = self
            .request_timeout_secs
            .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS);
        self.collections()?;
        Ok(self)
    }

    /// Supabase URL and anon key, or `None` for a local-only setup
    pub fn supabase(&self) -> Result<Option<(String, String)>> {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Ok(Some((url.clone(), anon_key.clone()))),
            _ => Err(Error::InvalidInput(
                "supabase_url and supabase_anon_key must be set together".to_string(),
            )),
        }
    }

    pub fn remote_config(&self) -> Result<Option<SupabaseRemoteConfig>> {
        Ok(self.supabase()?.map(|(url, anon_key)| {
            SupabaseRemoteConfig::new(url, anon_key)
                .with_table(self.records_table.clone())
                .with_timeout(self.request_timeout())
        }))
    }

    pub fn namespace(&self) -> StorageNamespace {
        StorageNamespace::new(self.storage_namespace.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn tombstone_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.tombstone_retention_days))
    }

    pub fn collections(&self) -> Result<Vec<Collection>> {
        self.collections
            .iter()
            .map(|name| Collection::new(name.as_str()))
            .collect()
    }
}

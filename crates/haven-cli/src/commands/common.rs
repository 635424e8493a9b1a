use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::auth::SessionHandle;
use haven_core::config::HavenConfig;
use haven_core::remote::{
    RemoteError, RemoteResult, RemoteStore, SupabaseRemoteStore, UpsertOutcome,
};
use haven_core::store::SqliteStore;
use haven_core::sync::{SyncCoordinator, SyncOptions};
use haven_core::{Collection, Record};
use serde_json::Value;

use crate::auth::auth_client;
use crate::error::CliError;
use crate::settings::{load_effective_config, resolve_config_path, resolve_db_path};

/// Remote used by the CLI: Supabase when configured, otherwise a remote that
/// reports every call as unauthenticated so sync stays in guest mode.
pub enum CliRemote {
    Supabase(SupabaseRemoteStore),
    Unconfigured,
}

#[async_trait]
impl RemoteStore for CliRemote {
    async fn fetch_changed_since(
        &self,
        collection: &str,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Record>> {
        match self {
            Self::Supabase(remote) => {
                remote
                    .fetch_changed_since(collection, owner_id, since)
                    .await
            }
            Self::Unconfigured => Err(RemoteError::Unauthenticated),
        }
    }

    async fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<UpsertOutcome> {
        match self {
            Self::Supabase(remote) => remote.upsert(collection, record).await,
            Self::Unconfigured => Err(RemoteError::Unauthenticated),
        }
    }

    async fn purge_tombstones(
        &self,
        collection: &str,
        owner_id: &str,
        older_than: DateTime<Utc>,
    ) -> RemoteResult<usize> {
        match self {
            Self::Supabase(remote) => {
                remote
                    .purge_tombstones(collection, owner_id, older_than)
                    .await
            }
            Self::Unconfigured => Err(RemoteError::Unauthenticated),
        }
    }
}

pub type CliCoordinator = SyncCoordinator<SqliteStore, CliRemote>;

/// Resolved config plus file locations for one CLI invocation
pub struct CliContext {
    pub config: HavenConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl CliContext {
    pub fn load(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path)?;
        let config = load_effective_config(&config_path)?;
        let db_path = resolve_db_path(db_path)?;
        Ok(Self {
            config,
            config_path,
            db_path,
        })
    }

    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        open_store(&self.db_path)
    }

    /// Coordinator over the local store, signed in when a stored session can be restored
    pub async fn coordinator(&self) -> Result<CliCoordinator, CliError> {
        let store = self.open_store()?;
        let session = self.restore_session().await?;

        let remote = match self.config.remote_config()? {
            Some(remote_config) => CliRemote::Supabase(
                SupabaseRemoteStore::new(remote_config, session.clone())
                    .map_err(|error| CliError::Config(error.to_string()))?,
            ),
            None => CliRemote::Unconfigured,
        };

        let options = SyncOptions {
            namespace: self.config.namespace(),
            ..SyncOptions::default()
        };
        Ok(SyncCoordinator::new(
            Arc::new(store),
            Arc::new(remote),
            session,
            options,
        ))
    }

    async fn restore_session(&self) -> Result<SessionHandle, CliError> {
        let session = SessionHandle::guest();
        let Some(client) =
            auth_client(&self.config).map_err(|error| CliError::Auth(error.to_string()))?
        else {
            return Ok(session);
        };

        if let Err(error) = client.restore_into(&session).await {
            tracing::warn!("Continuing in guest mode, session restore failed: {}", error);
        }
        Ok(session)
    }

    /// Collections named on the command line, or every configured collection
    pub fn collections(&self, names: &[String]) -> Result<Vec<Collection>, CliError> {
        if names.is_empty() {
            return Ok(self.config.collections()?);
        }
        names.iter().map(|name| parse_collection(name)).collect()
    }
}

pub fn open_store(path: &Path) -> Result<SqliteStore, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteStore::open(path)?)
}

pub fn parse_collection(name: &str) -> Result<Collection, CliError> {
    Collection::new(name.trim())
        .map_err(|_| CliError::InvalidArgument(format!("invalid collection name '{name}'")))
}

/// Parse `text` as JSON; anything that is not JSON is taken as a plain string
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Split `save` arguments into an optional key and the JSON payload
pub fn split_save_args(args: &[String]) -> Result<(Option<String>, String), CliError> {
    match args {
        [payload] => Ok((None, payload.clone())),
        [key, payload] => {
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::InvalidArgument("record key must not be empty".into()));
            }
            Ok((Some(key.to_string()), payload.clone()))
        }
        _ => Err(CliError::InvalidArgument(
            "expected `[KEY] JSON` after the collection".into(),
        )),
    }
}

/// Render a stored value for the terminal: strings bare, everything else as JSON
pub fn render_value(value: &Value) -> Result<String, CliError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => Ok(serde_json::to_string_pretty(other)?),
    }
}

pub fn format_record_line(record: &Record) -> String {
    let payload = serde_json::to_string(&record.payload).unwrap_or_default();
    let preview = if payload.chars().count() > 60 {
        let mut truncated = payload.chars().take(57).collect::<String>();
        truncated.push_str("...");
        truncated
    } else {
        payload
    };
    format!(
        "{:<36}  {}  {}",
        record.key,
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        preview
    )
}

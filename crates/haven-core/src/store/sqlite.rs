//! SQLite-backed local store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{migrations, LocalStore};
use crate::error::{Error, Result};

/// Local store persisted in a single SQLite file (or in memory for tests)
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Cap the database size in pages, emulating a platform storage quota
    ///
    /// SQLite never shrinks the cap below the current size.
    pub fn set_quota_pages(&self, pages: u32) -> Result<()> {
        self.lock()?
            .execute_batch(&format!("PRAGMA max_page_count = {pages};"))?;
        Ok(())
    }

    /// Filesystem location, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configure(&self) -> Result<()> {
        let conn = self.lock()?;
        // WAL is unavailable for in-memory databases
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        conn.execute_batch("PRAGMA synchronous = NORMAL;").ok();
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.lock()?;
        migrations::run(&mut conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("local store lock poisoned".to_string()))
    }
}

fn is_storage_full(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::DiskFull
    )
}

impl LocalStore for SqliteStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock()?
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, raw: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = self.lock()?.execute(
            "INSERT INTO kv_store (key, value, written_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, written_at = excluded.written_at",
            params![key, raw, now],
        );

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_storage_full(&error) => {
                tracing::warn!("Local storage is full; dropped write to '{}'", key);
                Err(Error::StorageFull {
                    key: key.to_string(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix_len = i64::try_from(prefix.chars().count())
            .map_err(|_| Error::InvalidInput("prefix too long".to_string()))?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix, prefix_len], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

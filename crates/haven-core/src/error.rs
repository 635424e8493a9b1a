//! Error types for haven-core

use thiserror::Error;

/// Result type alias using haven-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the local store and the backup/restore path
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The platform storage quota was exceeded; the write was dropped
    #[error("Storage is full, could not write '{key}'")]
    StorageFull { key: String },

    /// Record or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backup document is malformed or belongs to another application
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    /// Restore wrote some keys but not all of them
    #[error("Restore partially failed: {restored} key(s) restored, {failed} key(s) failed")]
    PartialFailure { restored: usize, failed: usize },
}

impl Error {
    /// Whether the caller can carry on after surfacing this error to the user.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StorageFull { .. } | Self::PartialFailure { .. } | Self::NotFound(_)
        )
    }
}

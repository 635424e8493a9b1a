use std::io;

use haven_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] haven_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0} collection(s) did not finish syncing; local changes are kept for the next pass")]
    SyncIncomplete(usize),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Supabase is not configured. Run `haven config init --supabase-url <URL> --supabase-anon-key <KEY>` first."
    )]
    RemoteNotConfigured,
}

impl CliError {
    /// Process exit code: 2 for a rejected backup, 3 for a partial restore,
    /// 4 for I/O failures, 1 for everything else
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(haven_core::Error::InvalidBackup(_)) => 2,
            Self::Core(haven_core::Error::PartialFailure { .. }) => 3,
            Self::Io(_) | Self::Core(haven_core::Error::Io(_)) => 4,
            _ => 1,
        }
    }
}

//! Config file and data file locations.

use std::env;
use std::path::{Path, PathBuf};

use haven_core::config::HavenConfig;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "haven.db";

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit.or_else(|| env::var_os("HAVEN_CONFIG").map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("haven").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

pub fn resolve_db_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit.or_else(|| env::var_os("HAVEN_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::data_dir()
        .map(|dir| dir.join("haven").join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

/// Config as written on disk; a missing file yields the defaults
pub fn load_file_config(path: &Path) -> Result<HavenConfig, CliError> {
    if !path.exists() {
        return Ok(HavenConfig::default());
    }

    let raw = std::fs::read_to_string(path)?;
    HavenConfig::from_json(&raw).map_err(|error| {
        CliError::Config(format!(
            "Failed to parse config at {}: {}",
            path.display(),
            error
        ))
    })
}

/// Config file with `HAVEN_*` environment overrides applied
pub fn load_effective_config(path: &Path) -> Result<HavenConfig, CliError> {
    load_file_config(path)?
        .with_overrides(|name| env::var(name).ok())
        .normalized()
        .map_err(|error| CliError::Config(error.to_string()))
}

pub fn save_config(path: &Path, config: &HavenConfig) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_string_pretty(config)?;
    std::fs::write(path, serialized)?;
    Ok(())
}

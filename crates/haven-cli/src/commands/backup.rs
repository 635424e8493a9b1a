use std::path::{Path, PathBuf};

use haven_core::backup::{
    export_all, read_backup_file, restore_all, suggested_backup_file_name, write_backup_file,
    BackupDocument,
};

use crate::commands::common::CliContext;
use crate::error::CliError;

pub fn run_export(output_path: Option<&Path>, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store()?;
    let document = export_all(&store, &context.config.namespace(), &context.config.app_name)?;

    let Some(path) = output_path else {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    };

    let path = resolve_export_path(path, &document);
    write_backup_file(&path, &document)?;
    println!("{}", path.display());
    Ok(())
}

pub fn run_import(path: &Path, context: &CliContext) -> Result<(), CliError> {
    let document = read_backup_file(path)?;
    let store = context.open_store()?;
    let report = restore_all(
        &store,
        &context.config.namespace(),
        &context.config.app_name,
        &document,
    )?;

    for failure in &report.failures {
        eprintln!("Failed to restore '{}': {}", failure.key, failure.reason);
    }
    let restored = report.into_result()?;
    println!("Restored {restored} key(s). Run `haven sync` to push them to other devices.");
    Ok(())
}

/// A directory gets the dated default file name; anything else is used as-is
pub fn resolve_export_path(path: &Path, document: &BackupDocument) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_backup_file_name(
            &document.app_name,
            document.export_date,
        ))
    } else {
        path.to_path_buf()
    }
}

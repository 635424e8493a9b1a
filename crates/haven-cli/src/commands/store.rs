use haven_core::store::LocalStore;

use crate::commands::common::{parse_value, render_value, CliContext};
use crate::error::CliError;

pub fn run_get(key: &str, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store()?;
    let storage_key = context.config.namespace().key(key);
    let Some(raw) = store.get_raw(&storage_key)? else {
        return Err(CliError::KeyNotFound(key.to_string()));
    };

    match serde_json::from_str(&raw) {
        Ok(value) => println!("{}", render_value(&value)?),
        Err(error) => {
            tracing::warn!("Stored value at '{}' is not valid JSON: {}", storage_key, error);
            println!("{raw}");
        }
    }
    Ok(())
}

pub fn run_set(key: &str, value: &str, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store()?;
    let storage_key = context.config.namespace().key(key);
    store.set(&storage_key, &parse_value(value))?;
    println!("Stored {key}");
    Ok(())
}

pub fn run_rm(key: &str, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store()?;
    let storage_key = context.config.namespace().key(key);
    if store.get_raw(&storage_key)?.is_none() {
        return Err(CliError::KeyNotFound(key.to_string()));
    }
    store.remove(&storage_key)?;
    println!("Removed {key}");
    Ok(())
}

pub fn run_keys(prefix: Option<&str>, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store()?;
    let namespace = context.config.namespace();
    let storage_prefix = namespace.key(prefix.unwrap_or_default());

    let keys = store
        .keys_with_prefix(&storage_prefix)?
        .into_iter()
        .filter(|key| namespace.owns(key))
        .collect::<Vec<_>>();
    if keys.is_empty() {
        println!("No keys found.");
        return Ok(());
    }

    for key in keys {
        println!("{}", key.strip_prefix(namespace.prefix()).unwrap_or(&key));
    }
    Ok(())
}

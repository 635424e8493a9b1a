//! Haven CLI - inspect, sync, and back up the local-first data store
//!
//! Works offline against the on-device store; syncs with Supabase when a
//! project is configured and a session is stored in the keychain.

mod auth;
mod cli;
mod commands;
mod error;
mod settings;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::backup::{run_export, run_import};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::records::{run_delete, run_list, run_push, run_reminder, run_save};
use crate::commands::store::{run_get, run_keys, run_rm, run_set};
use crate::commands::sync::{run_gc, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("haven=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = CliContext::load(cli.config, cli.db_path)?;
    match cli.command {
        Commands::Get { key } => run_get(&key, &context)?,
        Commands::Set { key, value } => run_set(&key, &value, &context)?,
        Commands::Rm { key } => run_rm(&key, &context)?,
        Commands::Keys { prefix } => run_keys(prefix.as_deref(), &context)?,
        Commands::Save { collection, args } => run_save(&collection, &args, &context).await?,
        Commands::Delete { collection, key } => run_delete(&collection, &key, &context).await?,
        Commands::List { collection, json } => run_list(&collection, json, &context).await?,
        Commands::Reminder { command } => run_reminder(command, &context).await?,
        Commands::Push { command } => run_push(command, &context).await?,
        Commands::Sync {
            collections,
            reset,
            adopt_guest,
            json,
        } => run_sync(&collections, reset, adopt_guest, json, &context).await?,
        Commands::Gc {
            collections,
            retention_days,
        } => run_gc(&collections, retention_days, &context).await?,
        Commands::Export { output } => run_export(output.as_deref(), &context)?,
        Commands::Import { path } => run_import(&path, &context)?,
        Commands::Auth { command } => run_auth(command, &context).await?,
        Commands::Config { command } => run_config(command, &context)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

use std::path::Path;

use haven_core::config::HavenConfig;
use haven_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::commands::common::CliContext;
use crate::error::CliError;
use crate::settings::{load_file_config, save_config};

pub fn run_config(command: ConfigCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            app_name,
        } => run_config_init(&context.config_path, supabase_url, supabase_anon_key, app_name),
        ConfigCommands::Show => {
            println!("# {}", context.config_path.display());
            println!("{}", serde_json::to_string_pretty(&redacted(&context.config))?);
            Ok(())
        }
    }
}

/// Merge explicit values into the config file at `path` and save it
pub fn run_config_init(
    path: &Path,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    app_name: Option<String>,
) -> Result<(), CliError> {
    let config = merge_config(
        load_file_config(path)?,
        supabase_url,
        supabase_anon_key,
        app_name,
    )?;
    save_config(path, &config)?;
    println!("Config written to {}", path.display());

    if config.supabase_url.is_some() {
        println!("Supabase is configured. Run `haven auth login --email <email> --password <password>`.");
    } else {
        println!("No Supabase project configured; records stay on this device.");
    }
    Ok(())
}

pub fn merge_config(
    mut config: HavenConfig,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    app_name: Option<String>,
) -> Result<HavenConfig, CliError> {
    if let Some(value) = normalize_text_option(supabase_url) {
        config.supabase_url = Some(value);
    }
    if let Some(value) = normalize_text_option(supabase_anon_key) {
        config.supabase_anon_key = Some(value);
    }
    if let Some(value) = normalize_text_option(app_name) {
        config.app_name = value;
    }
    config
        .normalized()
        .map_err(|error| CliError::Config(error.to_string()))
}

fn redacted(config: &HavenConfig) -> HavenConfig {
    let mut shown = config.clone();
    if shown.supabase_anon_key.is_some() {
        shown.supabase_anon_key = Some("<redacted>".to_string());
    }
    shown
}

use std::collections::BTreeMap;
use std::path::Path;

use haven_core::backup::{write_backup_file, BackupDocument};
use haven_core::config::HavenConfig;
use haven_core::remote::{RemoteError, RemoteStore};
use haven_core::store::{LocalStore, SqliteStore};
use haven_core::util::{epoch, now_millis};
use pretty_assertions::assert_eq;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::cli::CompletionShell;
use crate::commands::backup::{resolve_export_path, run_export, run_import};
use crate::commands::common::{
    parse_collection, parse_value, split_save_args, CliContext, CliRemote,
};
use crate::commands::completions::run_completions;
use crate::commands::config::merge_config;
use crate::commands::records::{parse_due_time, run_save};
use crate::commands::store::{run_rm, run_set};
use crate::commands::sync::run_sync;
use crate::error::CliError;
use crate::settings::{load_file_config, save_config};

fn context_in(dir: &Path, db_name: &str) -> CliContext {
    CliContext {
        config: HavenConfig::default(),
        config_path: dir.join("config.json"),
        db_path: dir.join(db_name),
    }
}

fn raw(value: Value) -> Box<RawValue> {
    serde_json::value::to_raw_value(&value).unwrap()
}

fn stored(context: &CliContext, storage_key: &str) -> Option<Value> {
    SqliteStore::open(&context.db_path)
        .unwrap()
        .get(storage_key)
        .unwrap()
}

#[test]
fn split_save_args_accepts_optional_key() {
    let args = vec![r#"{"title":"Tea"}"#.to_string()];
    assert_eq!(
        split_save_args(&args).unwrap(),
        (None, r#"{"title":"Tea"}"#.to_string())
    );

    let args = vec![" r1 ".to_string(), "{}".to_string()];
    assert_eq!(
        split_save_args(&args).unwrap(),
        (Some("r1".to_string()), "{}".to_string())
    );

    let args = vec!["  ".to_string(), "{}".to_string()];
    assert!(matches!(
        split_save_args(&args),
        Err(CliError::InvalidArgument(_))
    ));
    assert!(split_save_args(&[]).is_err());
}

#[test]
fn parse_value_falls_back_to_plain_string() {
    assert_eq!(parse_value(r#"{"x":2}"#), json!({"x": 2}));
    assert_eq!(parse_value("1"), json!(1));
    assert_eq!(parse_value("hello world"), json!("hello world"));
}

#[test]
fn parse_collection_rejects_invalid_names() {
    assert_eq!(parse_collection(" reminders ").unwrap().as_str(), "reminders");
    assert!(matches!(
        parse_collection("Reminders!"),
        Err(CliError::InvalidArgument(_))
    ));
}

#[test]
fn parse_due_time_requires_rfc3339() {
    let due = parse_due_time("2024-03-01T18:00:00+01:00").unwrap();
    assert_eq!(due.to_rfc3339(), "2024-03-01T17:00:00+00:00");
    assert!(parse_due_time("tomorrow").is_err());
}

#[test]
fn exit_codes_follow_error_kind() {
    let invalid = CliError::Core(haven_core::Error::InvalidBackup("bad".to_string()));
    let partial = CliError::Core(haven_core::Error::PartialFailure {
        restored: 1,
        failed: 1,
    });
    let io = CliError::Io(std::io::Error::other("disk"));
    let core_io = CliError::Core(haven_core::Error::Io(std::io::Error::other("disk")));

    assert_eq!(invalid.exit_code(), 2);
    assert_eq!(partial.exit_code(), 3);
    assert_eq!(io.exit_code(), 4);
    assert_eq!(core_io.exit_code(), 4);
    assert_eq!(CliError::KeyNotFound("k".to_string()).exit_code(), 1);
    assert_eq!(CliError::SyncIncomplete(1).exit_code(), 1);
}

#[test]
fn config_file_round_trips_and_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    assert_eq!(load_file_config(&path).unwrap(), HavenConfig::default());

    let config = merge_config(
        HavenConfig::default(),
        Some(" https://demo.supabase.co/ ".to_string()),
        Some("anon".to_string()),
        Some("haven-test".to_string()),
    )
    .unwrap();
    save_config(&path, &config).unwrap();

    let loaded = load_file_config(&path).unwrap();
    assert_eq!(loaded.supabase_url.as_deref(), Some("https://demo.supabase.co"));
    assert_eq!(loaded.app_name, "haven-test");
}

#[test]
fn malformed_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(load_file_config(&path), Err(CliError::Config(_))));
}

#[test]
fn merge_config_rejects_half_supabase_setup() {
    let result = merge_config(
        HavenConfig::default(),
        Some("https://demo.supabase.co".to_string()),
        None,
        None,
    );
    assert!(matches!(result, Err(CliError::Config(_))));
}

#[test]
fn set_and_rm_work_inside_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");

    run_set("settings", r#"{"theme":"dark"}"#, &context).unwrap();
    assert_eq!(stored(&context, "haven:settings"), Some(json!({"theme": "dark"})));

    run_rm("settings", &context).unwrap();
    assert_eq!(stored(&context, "haven:settings"), None);
    assert!(matches!(
        run_rm("settings", &context),
        Err(CliError::KeyNotFound(_))
    ));
}

#[test]
fn export_then_import_restores_every_key() {
    let dir = tempfile::tempdir().unwrap();
    let source = context_in(dir.path(), "source.db");
    run_set("a", "1", &source).unwrap();
    run_set("b", r#"{"x":2}"#, &source).unwrap();

    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    run_export(Some(backups.as_path()), &source).unwrap();

    let files = std::fs::read_dir(&backups)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    assert_eq!(files.len(), 1);
    let file_name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("haven-backup-"));

    let target = context_in(dir.path(), "target.db");
    run_import(&files[0], &target).unwrap();
    assert_eq!(stored(&target, "haven:a"), Some(json!(1)));
    assert_eq!(stored(&target, "haven:b"), Some(json!({"x": 2})));
}

#[test]
fn import_of_foreign_backup_exits_with_invalid_backup() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");
    let path = dir.path().join("foreign.json");
    write_backup_file(
        &path,
        &BackupDocument {
            version: "1.0".to_string(),
            export_date: now_millis(),
            app_name: "other-app".to_string(),
            data: [("haven:a".to_string(), raw(json!(1)))].into_iter().collect(),
            raw_text: BTreeMap::new(),
        },
    )
    .unwrap();

    let error = run_import(&path, &context).unwrap_err();
    assert_eq!(error.exit_code(), 2);
    assert_eq!(stored(&context, "haven:a"), None);
}

#[test]
fn import_with_bad_keys_exits_with_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");
    let path = dir.path().join("partial.json");
    write_backup_file(
        &path,
        &BackupDocument {
            version: "1.0".to_string(),
            export_date: epoch(),
            app_name: "haven".to_string(),
            data: [
                ("haven:a".to_string(), raw(json!(1))),
                ("elsewhere:b".to_string(), raw(json!(2))),
            ]
            .into_iter()
            .collect(),
            raw_text: BTreeMap::new(),
        },
    )
    .unwrap();

    let error = run_import(&path, &context).unwrap_err();
    assert_eq!(error.exit_code(), 3);
    assert_eq!(stored(&context, "haven:a"), Some(json!(1)));
}

#[test]
fn import_of_missing_file_exits_with_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");
    let error = run_import(&dir.path().join("missing.json"), &context).unwrap_err();
    assert_eq!(error.exit_code(), 4);
}

#[test]
fn export_path_uses_dated_name_only_for_directories() {
    let dir = tempfile::tempdir().unwrap();
    let document = BackupDocument {
        version: "1.0".to_string(),
        export_date: epoch(),
        app_name: "haven".to_string(),
        data: BTreeMap::new(),
        raw_text: BTreeMap::new(),
    };

    assert_eq!(
        resolve_export_path(dir.path(), &document),
        dir.path().join("haven-backup-1970-01-01.json")
    );
    let file = dir.path().join("mine.json");
    assert_eq!(resolve_export_path(&file, &document), file);
}

#[tokio::test]
async fn guest_save_is_stored_locally_without_owner() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");

    let args = vec!["r1".to_string(), r#"{"title":"Take meds"}"#.to_string()];
    run_save("reminders", &args, &context).await.unwrap();

    let envelope = stored(&context, "haven:reminders/r1").unwrap();
    assert_eq!(envelope["payload"], json!({"title": "Take meds"}));
    assert_eq!(envelope["owner"], Value::Null);
}

#[tokio::test]
async fn save_validates_known_collections() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");

    let args = vec![r#"{"title":"   "}"#.to_string()];
    assert!(run_save("reminders", &args, &context).await.is_err());

    let args = vec!["not json".to_string()];
    assert!(matches!(
        run_save("notes", &args, &context).await,
        Err(CliError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn sync_without_remote_is_guest_mode() {
    let dir = tempfile::tempdir().unwrap();
    let context = context_in(dir.path(), "haven.db");
    run_sync(&["reminders".to_string()], false, false, true, &context)
        .await
        .unwrap();
}

#[tokio::test]
async fn unconfigured_remote_reports_unauthenticated() {
    let remote = CliRemote::Unconfigured;
    let result = remote.fetch_changed_since("reminders", "user-1", epoch()).await;
    assert!(matches!(result, Err(RemoteError::Unauthenticated)));
    assert!(matches!(
        remote.purge_tombstones("reminders", "user-1", epoch()).await,
        Err(RemoteError::Unauthenticated)
    ));
}

#[test]
fn completions_name_the_haven_binary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("haven.bash");
    run_completions(CompletionShell::Bash, Some(path.as_path())).unwrap();

    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("haven"));
    assert!(script.contains("export"));
}

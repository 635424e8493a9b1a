//! Whole-store backup and restore.
//!
//! Works beneath the collection model: a backup is a flat map from raw
//! storage key to stored value, so it also carries settings that never sync.
//! Nothing here talks to the remote store.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{LocalStore, StorageNamespace};
use crate::util::now_millis;

/// Format version written by this build
pub const BACKUP_VERSION: &str = "1.0";
const SUPPORTED_MAJOR: &str = "1";

/// Stored values keep their exact bytes: JSON text is embedded verbatim in
/// `data`, anything else is carried as a string in `rawText`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    /// Must match the importing application
    pub app_name: String,
    pub data: BTreeMap<String, Box<RawValue>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_text: BTreeMap<String, String>,
}

impl BackupDocument {
    /// Number of keys carried by the document
    pub fn len(&self) -> usize {
        self.data.len() + self.raw_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.raw_text.is_empty()
    }

    /// Stored text for `key`, exactly as it will be restored
    pub fn stored_text(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(|value| value.get())
            .or_else(|| self.raw_text.get(key).map(String::as_str))
    }

    fn entries(&self) -> impl Iterator<Item = (&String, &str)> {
        self.data
            .iter()
            .map(|(key, value)| (key, value.get()))
            .chain(self.raw_text.iter().map(|(key, text)| (key, text.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of restored keys, or [`Error::PartialFailure`] if any key failed
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.restored)
        } else {
            Err(Error::PartialFailure {
                restored: self.restored,
                failed: self.failures.len(),
            })
        }
    }
}

/// Snapshot every key in `namespace`.
///
/// A stored value that is not a JSON document on its own is exported as raw
/// text. Keys that cannot be read at all are logged and left out.
pub fn export_all<S: LocalStore + ?Sized>(
    store: &S,
    namespace: &StorageNamespace,
    app_name: &str,
) -> Result<BackupDocument> {
    let mut data = BTreeMap::new();
    let mut raw_text = BTreeMap::new();

    for key in store.keys_with_prefix(namespace.prefix())? {
        if !namespace.owns(&key) {
            continue;
        }
        let raw = match store.get_raw(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(error) => {
                tracing::warn!("Skipping unreadable key '{}' in export: {}", key, error);
                continue;
            }
        };
        match RawValue::from_string(raw.clone()) {
            Ok(value) if value.get().len() == raw.len() => {
                data.insert(key, value);
            }
            Ok(_) => {
                raw_text.insert(key, raw);
            }
            Err(error) => {
                tracing::warn!("Exporting malformed value at '{}' as raw text: {}", key, error);
                raw_text.insert(key, raw);
            }
        }
    }

    tracing::info!("Exported {} key(s)", data.len() + raw_text.len());
    Ok(BackupDocument {
        version: BACKUP_VERSION.to_string(),
        export_date: now_millis(),
        app_name: app_name.to_string(),
        data,
        raw_text,
    })
}

/// Decode a backup document, rejecting anything that is not shaped like one
pub fn parse_backup_document(text: &str) -> Result<BackupDocument> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| Error::InvalidBackup(format!("not valid JSON: {error}")))?;

    let Some(object) = value.as_object() else {
        return Err(Error::InvalidBackup("expected a JSON object".to_string()));
    };
    if !object.get("data").is_some_and(Value::is_object) {
        return Err(Error::InvalidBackup(
            "'data' is missing or not an object".to_string(),
        ));
    }
    if !object.get("appName").is_some_and(Value::is_string) {
        return Err(Error::InvalidBackup("'appName' is missing".to_string()));
    }

    serde_json::from_str(text).map_err(|error| Error::InvalidBackup(error.to_string()))
}

/// Check that `document` was made by `app_name` in a compatible format
pub fn validate_backup(document: &BackupDocument, app_name: &str) -> Result<()> {
    if document.app_name != app_name {
        return Err(Error::InvalidBackup(format!(
            "backup belongs to '{}', not '{}'",
            document.app_name, app_name
        )));
    }
    let major = document.version.split('.').next().unwrap_or_default();
    if major.trim() != SUPPORTED_MAJOR {
        return Err(Error::InvalidBackup(format!(
            "unsupported backup version '{}'",
            document.version
        )));
    }
    Ok(())
}

/// Write every entry of `document` into `store`, overwriting existing keys.
///
/// The document is validated before anything is written. After that, one
/// bad key never stops the rest; failures are collected in the report.
pub fn restore_all<S: LocalStore + ?Sized>(
    store: &S,
    namespace: &StorageNamespace,
    app_name: &str,
    document: &BackupDocument,
) -> Result<RestoreReport> {
    validate_backup(document, app_name)?;

    let mut report = RestoreReport::default();
    for (key, text) in document.entries() {
        if !namespace.owns(key) {
            report.failures.push(RestoreFailure {
                key: key.clone(),
                reason: "key is outside the application namespace".to_string(),
            });
            continue;
        }

        match store.set_raw(key, text) {
            Ok(()) => report.restored += 1,
            Err(error) => {
                tracing::warn!("Failed to restore '{}': {}", key, error);
                report.failures.push(RestoreFailure {
                    key: key.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "Restored {} key(s), {} failure(s)",
        report.restored,
        report.failures.len()
    );
    Ok(report)
}

pub fn write_backup_file(path: &Path, document: &BackupDocument) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(document)?;
    fs::write(path, text)?;
    Ok(())
}

pub fn read_backup_file(path: &Path) -> Result<BackupDocument> {
    let text = fs::read_to_string(path)?;
    parse_backup_document(&text)
}

/// Default file name for a backup taken at `timestamp`, e.g. `haven-backup-2024-03-01.json`
pub fn suggested_backup_file_name(app_name: &str, timestamp: DateTime<Utc>) -> String {
    format!("{app_name}-backup-{}.json", timestamp.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, SYNC_STATE_PREFIX};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const APP: &str = "haven";

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn raw(value: Value) -> Box<RawValue> {
        serde_json::value::to_raw_value(&value).unwrap()
    }

    fn snapshot(store: &SqliteStore) -> BTreeMap<String, Option<String>> {
        store
            .keys_with_prefix("")
            .unwrap()
            .into_iter()
            .map(|key| {
                let raw = store.get_raw(&key).unwrap();
                (key, raw)
            })
            .collect()
    }

    #[test]
    fn export_then_import_restores_plain_values() {
        let namespace = StorageNamespace::new("");
        let source = store();
        source.set("a", &json!(1)).unwrap();
        source.set("b", &json!({"x": 2})).unwrap();

        let document = export_all(&source, &namespace, APP).unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document.stored_text("a"), Some("1"));
        assert_eq!(document.stored_text("b"), Some(r#"{"x":2}"#));
        assert!(document.raw_text.is_empty());

        let target = store();
        let report = restore_all(&target, &namespace, APP, &document).unwrap();
        assert_eq!(report.restored, 2);
        assert_eq!(target.get("a").unwrap(), Some(json!(1)));
        assert_eq!(target.get("b").unwrap(), Some(json!({"x": 2})));
    }

    #[test]
    fn round_trip_is_exact_per_key() {
        let namespace = StorageNamespace::default();
        let source = store();
        source.set("haven:settings/theme", &json!("dark")).unwrap();
        source
            .set("haven:reminders/r1", &json!({"key": "r1", "payload": {"title": "Walk"}}))
            .unwrap();
        source.set("haven:counters/water", &json!(3.5)).unwrap();
        source.set("haven:flags", &json!([true, null])).unwrap();
        source.set_raw("haven:settings/layout", r#"{"b":1,"a":2}"#).unwrap();
        source.set_raw("haven:settings/spaced", "{ \"a\" : [1, 2] }").unwrap();
        source.set_raw("haven:theme", "dark").unwrap();
        source.set_raw("haven:padded", " 7 ").unwrap();

        let document = export_all(&source, &namespace, APP).unwrap();
        let text = serde_json::to_string_pretty(&document).unwrap();
        let parsed = parse_backup_document(&text).unwrap();

        let target = store();
        restore_all(&target, &namespace, APP, &parsed)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(snapshot(&target), snapshot(&source));
    }

    #[test]
    fn export_skips_foreign_keys_and_sync_state() {
        let namespace = StorageNamespace::default();
        let source = store();
        source.set("haven:notes/n1", &json!("mine")).unwrap();
        source.set("other-app:setting", &json!(1)).unwrap();
        source
            .set(&format!("{SYNC_STATE_PREFIX}haven:notes"), &json!({}))
            .unwrap();

        let document = export_all(&source, &namespace, APP).unwrap();
        assert_eq!(document.data.keys().collect::<Vec<_>>(), vec!["haven:notes/n1"]);
        assert_eq!(document.version, BACKUP_VERSION);
        assert_eq!(document.app_name, APP);
    }

    #[test]
    fn malformed_stored_value_is_exported_as_raw_text() {
        let namespace = StorageNamespace::default();
        let source = store();
        source.set_raw("haven:broken", "{not json").unwrap();
        source.set("haven:fine", &json!(true)).unwrap();

        let document = export_all(&source, &namespace, APP).unwrap();
        assert_eq!(document.raw_text["haven:broken"], "{not json");
        assert_eq!(document.data["haven:fine"].get(), "true");

        let target = store();
        restore_all(&target, &namespace, APP, &document).unwrap();
        assert_eq!(target.get_raw("haven:broken").unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn backups_without_raw_text_still_parse() {
        let text = r#"{"version":"1.0","exportDate":"2024-01-01T00:00:00Z","appName":"haven","data":{"haven:a":{"b":1,"a":2}}}"#;
        let document = parse_backup_document(text).unwrap();
        assert!(document.raw_text.is_empty());
        assert_eq!(document.stored_text("haven:a"), Some(r#"{"b":1,"a":2}"#));
    }

    #[test]
    fn foreign_app_backup_is_rejected_without_writes() {
        let namespace = StorageNamespace::default();
        let document = BackupDocument {
            version: BACKUP_VERSION.to_string(),
            export_date: Utc::now(),
            app_name: "someone-else".to_string(),
            data: BTreeMap::from([("haven:a".to_string(), raw(json!(1)))]),
            raw_text: BTreeMap::new(),
        };

        let target = store();
        let error = restore_all(&target, &namespace, APP, &document).unwrap_err();
        assert!(matches!(error, Error::InvalidBackup(_)));
        assert!(target.keys_with_prefix("").unwrap().is_empty());
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let mut document = export_all(&store(), &StorageNamespace::default(), APP).unwrap();
        document.version = "2.0".to_string();
        assert!(matches!(
            validate_backup(&document, APP),
            Err(Error::InvalidBackup(_))
        ));
        document.version = "1.3".to_string();
        assert!(validate_backup(&document, APP).is_ok());
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        for text in [
            "not json",
            "[1, 2]",
            r#"{"version":"1.0","exportDate":"2024-01-01T00:00:00Z","appName":"haven"}"#,
            r#"{"version":"1.0","exportDate":"2024-01-01T00:00:00Z","appName":"haven","data":[]}"#,
            r#"{"version":"1.0","exportDate":"2024-01-01T00:00:00Z","data":{}}"#,
        ] {
            assert!(
                matches!(parse_backup_document(text), Err(Error::InvalidBackup(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn keys_outside_namespace_are_reported_per_key() {
        let namespace = StorageNamespace::default();
        let document = BackupDocument {
            version: BACKUP_VERSION.to_string(),
            export_date: Utc::now(),
            app_name: APP.to_string(),
            data: BTreeMap::from([
                ("haven:a".to_string(), raw(json!(1))),
                ("elsewhere".to_string(), raw(json!(2))),
                (format!("{SYNC_STATE_PREFIX}haven:notes"), raw(json!({}))),
            ]),
            raw_text: BTreeMap::from([("outside".to_string(), "dark".to_string())]),
        };

        let target = store();
        let report = restore_all(&target, &namespace, APP, &document).unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(target.get("haven:a").unwrap(), Some(json!(1)));
        assert!(matches!(
            report.into_result(),
            Err(Error::PartialFailure {
                restored: 1,
                failed: 3
            })
        ));
    }

    #[test]
    fn backup_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("backup.json");
        let source = store();
        source.set("haven:a", &json!({"nested": [1, 2, 3]})).unwrap();

        let document = export_all(&source, &StorageNamespace::default(), APP).unwrap();
        write_backup_file(&path, &document).unwrap();
        let loaded = read_backup_file(&path).unwrap();
        assert_eq!(
            serde_json::to_string(&loaded).unwrap(),
            serde_json::to_string(&document).unwrap()
        );

        let missing = read_backup_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, Error::Io(_)));
    }

    #[test]
    fn suggested_file_name_uses_export_day() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap();
        assert_eq!(
            suggested_backup_file_name(APP, timestamp),
            "haven-backup-2024-03-01.json"
        );
    }
}

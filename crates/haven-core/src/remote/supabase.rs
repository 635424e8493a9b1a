//! Supabase (PostgREST) remote store
//!
//! Rows live in one owner-scoped table guarded by row-level security.
//! Conditional writes go through the `upsert_sync_record` database function
//! so the newer-wins check and the write happen in one statement.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_owner, RemoteError, RemoteResult, RemoteStore, UpsertOutcome};
use crate::auth::SessionHandle;
use crate::models::Record;
use crate::util::{compact_text, is_http_url, to_iso8601};

pub const DEFAULT_RECORDS_TABLE: &str = "sync_records";
const UPSERT_FUNCTION: &str = "upsert_sync_record";
const PAGE_SIZE: usize = 1000;
const ROW_COLUMNS: &str = "collection,owner_id,key,payload,updated_at,deleted";

#[derive(Debug, Clone)]
pub struct SupabaseRemoteConfig {
    pub url: String,
    pub anon_key: String,
    pub table: String,
    pub timeout: Duration,
}

impl SupabaseRemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            table: DEFAULT_RECORDS_TABLE.to_string(),
            timeout: Duration::from_secs(12),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseRemoteStore {
    rest_url: String,
    anon_key: String,
    table: String,
    client: Client,
    session: SessionHandle,
}

impl SupabaseRemoteStore {
    pub fn new(config: SupabaseRemoteConfig, session: SessionHandle) -> RemoteResult<Self> {
        let rest_url = normalize_rest_url(&config.url)?;
        let anon_key = config.anon_key.trim().to_string();
        if anon_key.is_empty() {
            return Err(RemoteError::InvalidRecord(
                "Supabase anon key must not be empty".to_string(),
            ));
        }
        let table = config.table.trim().to_string();
        if table.is_empty() {
            return Err(RemoteError::InvalidRecord(
                "records table must not be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            rest_url,
            anon_key,
            table,
            client,
            session,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.rest_url, self.table)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rpc/{UPSERT_FUNCTION}", self.rest_url)
    }

    /// Attach credentials, failing fast when there is no usable session
    fn authorized(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let token = self
            .session
            .access_token()
            .ok_or(RemoteError::Unauthenticated)?;
        Ok(request
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }
}

#[async_trait]
impl RemoteStore for SupabaseRemoteStore {
    async fn fetch_changed_since(
        &self,
        collection: &str,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            let request = self.authorized(self.client.get(self.table_url()))?.query(&[
                ("select", ROW_COLUMNS.to_string()),
                ("collection", format!("eq.{collection}")),
                ("owner_id", format!("eq.{owner_id}")),
                ("updated_at", format!("gt.{}", to_iso8601(since))),
                ("order", "updated_at.asc,key.asc".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);

            let response = check_status(request.send().await?).await?;
            let rows = response.json::<Vec<RemoteRow>>().await?;
            let page_len = rows.len();
            records.extend(rows.into_iter().map(RemoteRow::into_record));

            if page_len < PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        tracing::debug!(
            "Fetched {} changed record(s) from '{}' since {}",
            records.len(),
            collection,
            to_iso8601(since)
        );
        Ok(records)
    }

    async fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<UpsertOutcome> {
        require_owner(record)?;
        let payload = if record.deleted {
            Value::Null
        } else {
            record.payload.clone()
        };
        let body = json!({
            "p_collection": collection,
            "p_key": record.key,
            "p_payload": payload,
            "p_updated_at": to_iso8601(record.updated_at),
            "p_deleted": record.deleted,
        });

        let request = self.authorized(self.client.post(self.rpc_url()))?.json(&body);
        let response = check_status(request.send().await?).await?;
        let result = response.json::<UpsertResponse>().await?;
        let stored = result.record.into_record();

        if result.applied {
            Ok(UpsertOutcome::Applied(stored))
        } else {
            tracing::debug!(
                "Remote kept newer copy of '{}/{}' ({})",
                collection,
                stored.key,
                to_iso8601(stored.updated_at)
            );
            Ok(UpsertOutcome::Rejected(stored))
        }
    }

    async fn purge_tombstones(
        &self,
        collection: &str,
        owner_id: &str,
        older_than: DateTime<Utc>,
    ) -> RemoteResult<usize> {
        let request = self
            .authorized(self.client.delete(self.table_url()))?
            .header("Prefer", "return=representation")
            .query(&[
                ("select", "key".to_string()),
                ("collection", format!("eq.{collection}")),
                ("owner_id", format!("eq.{owner_id}")),
                ("deleted", "is.true".to_string()),
                ("updated_at", format!("lt.{}", to_iso8601(older_than))),
            ]);

        let response = check_status(request.send().await?).await?;
        let removed = response.json::<Vec<Value>>().await?;
        Ok(removed.len())
    }
}

pub fn normalize_rest_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() || !is_http_url(trimmed) {
        return Err(RemoteError::InvalidRecord(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthenticated,
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            RemoteError::NetworkUnavailable(parse_api_error(status, body))
        }
        _ => RemoteError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

#[derive(Debug, Deserialize)]
struct RemoteRow {
    owner_id: String,
    key: String,
    #[serde(default)]
    payload: Option<Value>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    deleted: bool,
}

impl RemoteRow {
    fn into_record(self) -> Record {
        let payload = if self.deleted {
            Value::Null
        } else {
            self.payload.unwrap_or(Value::Null)
        };
        Record {
            key: self.key,
            payload,
            updated_at: self.updated_at,
            deleted: self.deleted,
            owner: Some(self.owner_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    applied: bool,
    record: RemoteRow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("http://localhost:54321/rest/v1").unwrap(),
            "http://localhost:54321/rest/v1"
        );
        assert!(normalize_rest_url("demo.supabase.co").is_err());
        assert!(normalize_rest_url("  ").is_err());
    }

    #[test]
    fn row_decoding_maps_tombstones_to_null_payload() {
        let rows: Vec<RemoteRow> = serde_json::from_str(
            r#"[
                {"collection":"reminders","owner_id":"user-1","key":"r1",
                 "payload":{"title":"Take medicine"},
                 "updated_at":"2024-03-01T10:00:00.250+00:00","deleted":false},
                {"collection":"reminders","owner_id":"user-1","key":"r2",
                 "payload":{"stale":true},
                 "updated_at":"2024-03-01T10:00:01+00:00","deleted":true}
            ]"#,
        )
        .unwrap();
        let records: Vec<Record> = rows.into_iter().map(RemoteRow::into_record).collect();

        assert_eq!(records[0].payload, json!({"title": "Take medicine"}));
        assert_eq!(
            records[0].updated_at,
            Utc.timestamp_millis_opt(1_709_287_200_250).unwrap()
        );
        assert_eq!(records[0].owner.as_deref(), Some("user-1"));
        assert!(records[1].deleted);
        assert_eq!(records[1].payload, Value::Null);
    }

    #[test]
    fn upsert_response_decodes_rejection() {
        let response: UpsertResponse = serde_json::from_str(
            r#"{"applied":false,"record":{"collection":"notes","owner_id":"u","key":"n1",
                "payload":"kept","updated_at":"2024-01-01T00:00:00Z","deleted":false}}"#,
        )
        .unwrap();
        assert!(!response.applied);
        assert_eq!(response.record.into_record().payload, json!("kept"));
    }

    #[test]
    fn auth_failures_map_to_unauthenticated() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthenticated
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "{}"),
            RemoteError::Unauthenticated
        ));
        assert!(matches!(
            classify_failure(StatusCode::SERVICE_UNAVAILABLE, ""),
            RemoteError::NetworkUnavailable(_)
        ));
    }

    #[test]
    fn api_errors_prefer_postgrest_message() {
        let error = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"code":"22P02","message":"invalid input syntax for type uuid","details":null}"#,
        );
        match error {
            RemoteError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid input syntax for type uuid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, ""), "HTTP 404");
    }

    #[tokio::test]
    async fn guest_session_short_circuits_without_network() {
        let config = SupabaseRemoteConfig::new("http://127.0.0.1:9", "anon");
        let remote = SupabaseRemoteStore::new(config, SessionHandle::guest()).unwrap();

        let fetch = remote
            .fetch_changed_since("reminders", "user-1", Utc::now())
            .await;
        assert!(matches!(fetch, Err(RemoteError::Unauthenticated)));

        let record = Record::new("r1", json!(1), Some("user-1".to_string()));
        let upsert = remote.upsert("reminders", &record).await;
        assert!(matches!(upsert, Err(RemoteError::Unauthenticated)));
    }

    #[test]
    fn config_rejects_empty_anon_key() {
        let config = SupabaseRemoteConfig::new("https://demo.supabase.co", " ");
        assert!(SupabaseRemoteStore::new(config, SessionHandle::guest()).is_err());
    }
}

//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    Utc::now().timestamp()
}

/// Current time truncated to whole milliseconds.
///
/// Record timestamps travel as ISO-8601 text with millisecond precision, so
/// anything finer would make a value compare unequal to its own round trip.
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .unwrap_or(value)
}

/// The Unix epoch, used as the lower bound of a never-synced collection.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Render a timestamp as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn to_iso8601(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

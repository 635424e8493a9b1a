//! Typed collection payloads and caller-side schema validation

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{AacButton, PushSubscription, Reminder};
use crate::error::{Error, Result};

/// A payload schema bound to one collection.
///
/// The local store and sync engine treat payloads as opaque JSON; types that
/// implement this trait validate content before it reaches them.
pub trait CollectionPayload: Serialize + DeserializeOwned {
    /// Name of the collection holding this payload type
    const COLLECTION: &'static str;

    /// Check field-level constraints
    fn validate(&self) -> Result<()>;
}

/// Decode and validate a raw payload for a known collection.
///
/// Collections without a registered schema accept any JSON value.
pub fn validate_payload(collection: &str, payload: &Value) -> Result<()> {
    if collection == AacButton::COLLECTION {
        check::<AacButton>(payload)
    } else if collection == Reminder::COLLECTION {
        check::<Reminder>(payload)
    } else if collection == PushSubscription::COLLECTION {
        check::<PushSubscription>(payload)
    } else {
        Ok(())
    }
}

fn check<T: CollectionPayload>(payload: &Value) -> Result<()> {
    let typed: T = serde_json::from_value(payload.clone()).map_err(|error| {
        Error::InvalidInput(format!("Invalid {} payload: {error}", T::COLLECTION))
    })?;
    typed.validate()
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_collections_accept_anything() {
        assert!(validate_payload("counters", &json!(42)).is_ok());
        assert!(validate_payload("notes", &json!({"free": "form"})).is_ok());
    }

    #[test]
    fn reminders_are_checked() {
        assert!(validate_payload("reminders", &json!({"title": "Take medicine"})).is_ok());
        assert!(validate_payload("reminders", &json!({"title": "  "})).is_err());
        assert!(validate_payload("reminders", &json!(7)).is_err());
    }

    #[test]
    fn aac_buttons_are_checked() {
        assert!(validate_payload("aac_buttons", &json!({"label": "More"})).is_ok());
        assert!(validate_payload("aac_buttons", &json!({"speech": "more please"})).is_err());
    }
}

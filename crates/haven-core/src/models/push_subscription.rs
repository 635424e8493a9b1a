//! Web-push device registration, synced like any other record

use serde::{Deserialize, Serialize};

use super::payload::{require_text, CollectionPayload};
use crate::error::{Error, Result};
use crate::util::is_http_url;

/// Encryption keys issued by the browser push service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A device endpoint registered for push notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl PushSubscription {
    /// Record key for this subscription: one record per endpoint
    pub fn record_key(&self) -> String {
        self.endpoint.trim().to_string()
    }
}

impl CollectionPayload for PushSubscription {
    const COLLECTION: &'static str = "push_subscriptions";

    fn validate(&self) -> Result<()> {
        require_text(&self.endpoint, "endpoint")?;
        if !is_http_url(self.endpoint.trim()) {
            return Err(Error::InvalidInput(
                "endpoint must include http:// or https://".to_string(),
            ));
        }
        require_text(&self.keys.p256dh, "keys.p256dh")?;
        require_text(&self.keys.auth, "keys.auth")
    }
}

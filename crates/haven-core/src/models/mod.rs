//! Data models for Haven

mod aac_button;
mod collection;
mod payload;
mod push_subscription;
mod record;
mod reminder;

pub use aac_button::AacButton;
pub use collection::{Collection, SyncState};
pub use payload::{validate_payload, CollectionPayload};
pub use push_subscription::{PushKeys, PushSubscription};
pub use record::Record;
pub use reminder::Reminder;

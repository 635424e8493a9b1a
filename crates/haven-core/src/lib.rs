//! haven-core - Core library for Haven
//!
//! Local-first storage for a special-needs support app: a durable key-value
//! store on the device, an owner-scoped Supabase mirror, the coordinator that
//! reconciles the two, and whole-store backup/restore.

pub mod auth;
pub mod backup;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Collection, Record, SyncState};

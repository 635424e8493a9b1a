pub mod auth_cmd;
pub mod backup;
pub mod common;
pub mod completions;
pub mod config;
pub mod records;
pub mod store;
pub mod sync;

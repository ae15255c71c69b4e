//! Worklog core library: domain types, config persistence, errors.
//!
//! Public API surface:
//! - [`types`]: entity kinds, sync configuration, config patches
//! - [`error`]: [`ConfigError`]
//! - [`config_store`]: load / update / persist the sync configuration

pub mod config_store;
pub mod error;
pub mod types;

pub use config_store::ConfigStore;
pub use error::ConfigError;
pub use types::{ConfigPatch, EntityKind, SyncConfig};

//! Domain types for the worklog sync engine.
//!
//! All types are serializable/deserializable via serde. Persisted and wire
//! representations use camelCase keys.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// One of the four entity collections mirrored from the remote tracker.
///
/// Declaration order is phase order: time entries reference the other three
/// kinds by id, so they are always processed last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Users,
    Projects,
    Activities,
    TimeEntries,
}

impl EntityKind {
    /// Every kind, in phase order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Users,
        EntityKind::Projects,
        EntityKind::Activities,
        EntityKind::TimeEntries,
    ];

    /// Local document-store collection name.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Projects => "projects",
            EntityKind::Activities => "activities",
            EntityKind::TimeEntries => "time_entries",
        }
    }

    /// Prefix of the local id (`{prefix}_{externalId}`).
    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::Users => "user",
            EntityKind::Projects => "project",
            EntityKind::Activities => "activity",
            EntityKind::TimeEntries => "time_entry",
        }
    }

    /// Deterministic local identity for a remote record.
    pub fn local_id(self, external_id: u64) -> String {
        format!("{}_{external_id}", self.id_prefix())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Users => write!(f, "users"),
            EntityKind::Projects => write!(f, "projects"),
            EntityKind::Activities => write!(f, "activities"),
            EntityKind::TimeEntries => write!(f, "timeEntries"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_TIME_ENTRY_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection parameters and scheduling intent, persisted in `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(rename = "syncIntervalMinutes", default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub enabled: bool,
    /// Days of time entries requested per run, ending today.
    #[serde(default = "default_time_entry_window_days")]
    pub time_entry_window_days: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_interval_minutes() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_time_entry_window_days() -> u32 {
    DEFAULT_TIME_ENTRY_WINDOW_DAYS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            enabled: false,
            time_entry_window_days: DEFAULT_TIME_ENTRY_WINDOW_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Check the connection parameters without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(url.to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::NonPositive {
                field: "syncIntervalMinutes",
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "requestTimeoutSecs",
            });
        }
        Ok(())
    }

    /// Whether a schedule may be armed for this config.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.validate().is_ok()
    }

    /// API base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.api_url.trim().trim_end_matches('/')
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Merge a partial update over this config.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(api_url) = patch.api_url {
            self.api_url = api_url;
        }
        if let Some(api_key) = patch.api_key {
            self.api_key = api_key;
        }
        if let Some(minutes) = patch.interval_minutes {
            self.interval_minutes = minutes;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(days) = patch.time_entry_window_days {
            self.time_entry_window_days = days;
        }
        if let Some(secs) = patch.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
    }

    /// Copy safe to print or send over the control socket.
    pub fn redacted(&self) -> SyncConfig {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            copy.api_key = "********".to_string();
        }
        copy
    }
}

/// Partial config update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(
        rename = "syncIntervalMinutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub interval_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_entry_window_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

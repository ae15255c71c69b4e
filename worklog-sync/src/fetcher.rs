//! Remote reads, one authenticated GET per entity kind.
//!
//! [`HttpFetcher`] is the production [`EntitySource`]; it performs no retry
//! or backoff. A failed request fails the phase, and recovery is left to the
//! next scheduled or manual run.

use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;

use worklog_core::{EntityKind, SyncConfig};

use crate::error::{mapping_err, network_err, SyncError};
use crate::mapper;

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Inclusive date range requested for time entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TimeWindow {
    /// `days` days back from today (UTC), inclusive of today.
    pub fn ending_today(days: u32) -> Self {
        let to = Utc::now().date_naive();
        let from = to
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to }
    }
}

/// Something that can return the raw items of one collection.
pub trait EntitySource: Send + Sync {
    fn fetch(&self, kind: EntityKind, window: &TimeWindow) -> Result<Vec<Value>, SyncError>;
}

/// Builds an [`EntitySource`] for the config in force when a run starts.
pub trait Connect: Send + Sync {
    fn connect(&self, config: &SyncConfig) -> Result<Box<dyn EntitySource>, SyncError>;
}

/// Resource path (and query) for `kind`, relative to the API base URL.
pub fn resource_path(kind: EntityKind, window: &TimeWindow) -> String {
    match kind {
        EntityKind::Users => "/users.json".to_string(),
        EntityKind::Projects => "/projects.json".to_string(),
        EntityKind::Activities => "/enumerations/time_entry_activities.json".to_string(),
        EntityKind::TimeEntries => format!(
            "/time_entries.json?from={}&to={}",
            window.from.format("%Y-%m-%d"),
            window.to.format("%Y-%m-%d")
        ),
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Blocking JSON client for the remote tracker.
pub struct HttpFetcher {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpFetcher {
    /// Validate `config` and build a client whose requests time out after
    /// `requestTimeoutSecs`.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout())
            .build();
        Ok(Self {
            agent,
            base_url: config.base_url().to_string(),
            api_key: config.api_key.trim().to_string(),
        })
    }

    fn get_json(&self, kind: EntityKind, path: &str) -> Result<Value, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(kind = %kind, url = %url, "fetching");

        let response = self
            .agent
            .get(&url)
            .set(API_KEY_HEADER, &self.api_key)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(code, response) => network_err(
                    kind,
                    format!("GET {url} returned HTTP {code} {}", response.status_text()),
                ),
                ureq::Error::Transport(transport) => {
                    network_err(kind, format!("GET {url} failed: {transport}"))
                }
            })?;

        response.into_json::<Value>().map_err(|err| {
            if err.kind() == std::io::ErrorKind::InvalidData {
                mapping_err(kind, format!("GET {url} returned invalid JSON: {err}"))
            } else {
                network_err(kind, format!("GET {url} body read failed: {err}"))
            }
        })
    }
}

impl EntitySource for HttpFetcher {
    fn fetch(&self, kind: EntityKind, window: &TimeWindow) -> Result<Vec<Value>, SyncError> {
        let body = self.get_json(kind, &resource_path(kind, window))?;
        mapper::items(kind, body)
    }
}

/// [`Connect`] implementation producing [`HttpFetcher`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connect for HttpConnector {
    fn connect(&self, config: &SyncConfig) -> Result<Box<dyn EntitySource>, SyncError> {
        Ok(Box::new(HttpFetcher::new(config)?))
    }
}

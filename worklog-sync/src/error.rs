//! Error types for worklog-sync.

use std::path::PathBuf;

use thiserror::Error;

use worklog_core::{ConfigError, EntityKind};

/// Failures raised by a [`crate::LocalUpsertSink`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ids become file names; anything that could escape the collection is refused.
    #[error("invalid document id '{0}'")]
    InvalidId(String),
}

/// All errors that can end a sync run or a store maintenance call.
///
/// Phase errors carry the [`EntityKind`] so the recorded message names the
/// phase that failed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid connection parameters; raised before any request.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Rejected request, non-2xx status, or timeout.
    #[error("network error in {kind} phase: {message}")]
    Network { kind: EntityKind, message: String },

    /// Payload that cannot be interpreted as the expected collection.
    #[error("mapping error in {kind} phase: {message}")]
    Mapping { kind: EntityKind, message: String },

    /// A local upsert failed.
    #[error("store error in {kind} phase ({collection}): {source}")]
    Store {
        kind: EntityKind,
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to clear collection {collection}: {source}")]
    Clear {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    /// Another run holds the run guard.
    #[error("a sync run is in progress")]
    Busy,

    #[error("run lock error at {path}: {source}")]
    RunLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Phase the error belongs to, if any.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            SyncError::Network { kind, .. }
            | SyncError::Mapping { kind, .. }
            | SyncError::Store { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn mapping_err(kind: EntityKind, message: impl Into<String>) -> SyncError {
    SyncError::Mapping {
        kind,
        message: message.into(),
    }
}

pub(crate) fn network_err(kind: EntityKind, message: impl Into<String>) -> SyncError {
    SyncError::Network {
        kind,
        message: message.into(),
    }
}

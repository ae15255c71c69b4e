//! # worklog-sync
//!
//! Remote-to-local synchronization engine.
//!
//! A run pulls users, projects, activities and time entries (in that order)
//! through an [`EntitySource`], maps them with [`mapper::map`], and upserts
//! them into a [`LocalUpsertSink`] under deterministic local ids. Progress
//! and failures are recorded in a shared [`StatusTracker`].
//!
//! Call [`SyncOrchestrator::start_sync`] to drive one run.

pub mod error;
pub mod fetcher;
pub mod mapper;
pub mod orchestrator;
pub mod pipeline;
pub mod run_lock;
pub mod status;
pub mod store;

pub use error::{StoreError, SyncError};
pub use fetcher::{Connect, EntitySource, HttpConnector, HttpFetcher, TimeWindow};
pub use mapper::{EntityRecord, SyncEntity};
pub use orchestrator::{RunOutcome, RunSummary, SyncOrchestrator};
pub use run_lock::RunLock;
pub use status::{StatusTracker, SyncStatus};
pub use store::{FileStore, LocalUpsertSink, MemoryStore};

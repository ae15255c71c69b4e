//! Run driver.
//!
//! ## `start_sync` protocol
//!
//! 1. Claim the run guard (and the cross-process [`RunLock`], when one is
//!    configured); if another run holds either, return
//!    [`RunOutcome::AlreadyRunning`] without touching status.
//! 2. Mark the run started (clears `last_error`, progress, stats).
//! 3. Validate the config and connect, before any request.
//! 4. Run the phases users → projects → activities → time entries.
//! 5. Stop at the first failing phase and record its message.
//! 6. On success stamp `last_sync_at`.
//!
//! A run that unwinds out of a phase is still closed as failed, so
//! `is_running` never sticks at `true`.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use worklog_core::{EntityKind, SyncConfig};

use crate::error::SyncError;
use crate::fetcher::{Connect, TimeWindow};
use crate::pipeline;
use crate::run_lock::RunLock;
use crate::status::StatusTracker;
use crate::store::LocalUpsertSink;

/// Counts of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub counts: BTreeMap<EntityKind, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Result of asking for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
}

/// Drives runs against one sink and one status tracker.
///
/// At most one run (or clear) executes at a time; the guard is claimed with
/// a non-blocking `try_lock`, so overlapping callers return immediately.
/// Orchestrators in different processes sharing a store coordinate through
/// [`SyncOrchestrator::with_run_lock`].
pub struct SyncOrchestrator {
    connector: Arc<dyn Connect>,
    sink: Arc<dyn LocalUpsertSink>,
    status: Arc<StatusTracker>,
    run_guard: Mutex<()>,
    run_lock: Option<RunLock>,
}

impl SyncOrchestrator {
    pub fn new(
        connector: Arc<dyn Connect>,
        sink: Arc<dyn LocalUpsertSink>,
        status: Arc<StatusTracker>,
    ) -> Self {
        Self {
            connector,
            sink,
            status,
            run_guard: Mutex::new(()),
            run_lock: None,
        }
    }

    /// Also hold `lock` for every run and clear.
    pub fn with_run_lock(mut self, lock: RunLock) -> Self {
        self.run_lock = Some(lock);
        self
    }

    pub fn status(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    pub fn sink(&self) -> &Arc<dyn LocalUpsertSink> {
        &self.sink
    }

    /// Run all phases once with `config`.
    ///
    /// Phase failures are recorded in the status tracker and also returned.
    pub fn start_sync(&self, config: &SyncConfig) -> Result<RunOutcome, SyncError> {
        let Some(_guard) = self.try_claim() else {
            tracing::debug!("sync requested while a run is in progress; skipping");
            return Ok(RunOutcome::AlreadyRunning);
        };
        let mut lock_file = self.open_run_lock()?;
        let Some(_held) = self.hold_run_lock(&mut lock_file)? else {
            tracing::debug!("run lock held by another process; skipping");
            return Ok(RunOutcome::AlreadyRunning);
        };

        let started_at = Utc::now();
        self.status.begin_run(started_at);
        let run = OpenRun::new(&self.status);
        tracing::info!("sync run started");

        match self.run_phases(config) {
            Ok(counts) => {
                let finished_at = Utc::now();
                let elapsed = run.finish_success(finished_at);
                tracing::info!(
                    users = counts.get(&EntityKind::Users).copied().unwrap_or(0),
                    projects = counts.get(&EntityKind::Projects).copied().unwrap_or(0),
                    activities = counts.get(&EntityKind::Activities).copied().unwrap_or(0),
                    time_entries = counts.get(&EntityKind::TimeEntries).copied().unwrap_or(0),
                    duration_ms = elapsed,
                    "sync run completed",
                );
                Ok(RunOutcome::Completed(RunSummary {
                    counts,
                    started_at,
                    finished_at,
                    duration_ms: elapsed,
                }))
            }
            Err(err) => {
                run.finish_failure(err.to_string());
                tracing::error!(error = %err, "sync run failed");
                Err(err)
            }
        }
    }

    /// Empty all four local collections.
    ///
    /// Refused with [`SyncError::Busy`] while a run is in progress.
    pub fn clear_data(&self) -> Result<(), SyncError> {
        let Some(_guard) = self.try_claim() else {
            return Err(SyncError::Busy);
        };
        let mut lock_file = self.open_run_lock()?;
        let Some(_held) = self.hold_run_lock(&mut lock_file)? else {
            return Err(SyncError::Busy);
        };
        for kind in EntityKind::ALL {
            let collection = kind.collection();
            self.sink
                .clear(collection)
                .map_err(|source| SyncError::Clear { collection, source })?;
        }
        self.status.reset_counters();
        tracing::info!("local collections cleared");
        Ok(())
    }

    fn run_phases(&self, config: &SyncConfig) -> Result<BTreeMap<EntityKind, usize>, SyncError> {
        config.validate()?;
        let source = self.connector.connect(config)?;
        let window = TimeWindow::ending_today(config.time_entry_window_days);

        let mut counts = BTreeMap::new();
        for kind in EntityKind::ALL {
            self.status.enter_phase(kind);
            let processed =
                pipeline::run_phase(kind, source.as_ref(), self.sink.as_ref(), &window, &self.status)?;
            self.status.complete_phase(kind, processed);
            counts.insert(kind, processed);
        }
        Ok(counts)
    }

    fn try_claim(&self) -> Option<MutexGuard<'_, ()>> {
        match self.run_guard.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn open_run_lock(&self) -> Result<Option<fd_lock::RwLock<File>>, SyncError> {
        self.run_lock.as_ref().map(RunLock::open).transpose()
    }

    /// `Some` when the run may proceed: either no lock is configured or it
    /// was taken. `None` when another process holds it.
    fn hold_run_lock<'a>(
        &self,
        file: &'a mut Option<fd_lock::RwLock<File>>,
    ) -> Result<Option<Option<fd_lock::RwLockWriteGuard<'a, File>>>, SyncError> {
        match (self.run_lock.as_ref(), file.as_mut()) {
            (Some(lock), Some(file)) => Ok(lock.try_hold(file)?.map(Some)),
            _ => Ok(Some(None)),
        }
    }
}

/// Closes a run in the status tracker exactly once, including on unwind.
struct OpenRun<'a> {
    status: &'a StatusTracker,
    clock: Instant,
    closed: bool,
}

impl<'a> OpenRun<'a> {
    fn new(status: &'a StatusTracker) -> Self {
        Self {
            status,
            clock: Instant::now(),
            closed: false,
        }
    }

    /// Returns the run duration in milliseconds.
    fn finish_success(mut self, finished_at: DateTime<Utc>) -> u64 {
        let elapsed = self.clock.elapsed();
        self.status.finish_success(finished_at, elapsed);
        self.closed = true;
        elapsed.as_millis() as u64
    }

    fn finish_failure(mut self, message: String) {
        self.status.finish_failure(message, self.clock.elapsed());
        self.closed = true;
    }
}

impl Drop for OpenRun<'_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::error!("sync run aborted by a panic");
            self.status
                .finish_failure("sync run aborted unexpectedly".to_string(), self.clock.elapsed());
        }
    }
}

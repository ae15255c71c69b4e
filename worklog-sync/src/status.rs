//! Run status shared between the orchestrator, the scheduler and readers.
//!
//! Per-run state machine:
//!
//! ```text
//! Idle → Running(users) → Running(projects) → Running(activities)
//!      → Running(timeEntries) → Idle(success)
//! Running(*) → Idle(error)
//! ```
//!
//! Nothing resumes mid-phase; every run starts again at `Running(users)`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use worklog_core::EntityKind;

/// Read-only snapshot handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_running: bool,
    /// Kind whose phase is active while `is_running`.
    pub current_phase: Option<EntityKind>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// 0..=100 per kind; 100 only once the phase completed.
    pub progress: BTreeMap<EntityKind, u8>,
    /// Records processed per kind in the current or most recent run.
    pub stats: BTreeMap<EntityKind, usize>,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
}

/// Mutex-guarded [`SyncStatus`].
///
/// Run fields are written by the orchestrator; `next_sync_at` is written by
/// the scheduler.
#[derive(Debug, Default)]
pub struct StatusTracker {
    inner: Mutex<SyncStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    pub fn set_next_sync_at(&self, next: Option<DateTime<Utc>>) {
        self.lock().next_sync_at = next;
    }

    pub(crate) fn begin_run(&self, started_at: DateTime<Utc>) {
        let mut status = self.lock();
        status.is_running = true;
        status.current_phase = None;
        status.last_error = None;
        status.progress.clear();
        status.stats.clear();
        status.last_run_started_at = Some(started_at);
    }

    pub(crate) fn enter_phase(&self, kind: EntityKind) {
        let mut status = self.lock();
        status.current_phase = Some(kind);
        status.progress.insert(kind, 0);
    }

    /// Partial progress inside a phase; capped below 100 until completion.
    pub(crate) fn record_progress(&self, kind: EntityKind, done: usize, total: usize) {
        let percent = if total == 0 {
            0
        } else {
            (done.saturating_mul(100) / total).min(99) as u8
        };
        self.lock().progress.insert(kind, percent);
    }

    pub(crate) fn complete_phase(&self, kind: EntityKind, processed: usize) {
        let mut status = self.lock();
        status.progress.insert(kind, 100);
        status.stats.insert(kind, processed);
    }

    pub(crate) fn finish_success(&self, finished_at: DateTime<Utc>, elapsed: Duration) {
        let mut status = self.lock();
        status.is_running = false;
        status.current_phase = None;
        status.last_sync_at = Some(finished_at);
        status.last_run_duration_ms = Some(elapsed.as_millis() as u64);
    }

    /// Close a failed run. The failing phase loses its partial progress so
    /// only phases completed in this run carry values.
    pub(crate) fn finish_failure(&self, message: String, elapsed: Duration) {
        let mut status = self.lock();
        if let Some(kind) = status.current_phase.take() {
            status.progress.remove(&kind);
        }
        status.is_running = false;
        status.last_error = Some(message);
        status.last_run_duration_ms = Some(elapsed.as_millis() as u64);
    }

    /// Forget per-kind counters after the local store was emptied.
    pub(crate) fn reset_counters(&self) {
        let mut status = self.lock();
        status.progress.clear();
        status.stats.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

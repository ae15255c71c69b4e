//! The long-lived sync engine hosted by the daemon.
//!
//! `SyncEngine` owns the config store, the scheduler and the orchestrator.
//! Config updates and schedule reconciliation happen under one lock, so the
//! armed timer always matches the persisted config.

use std::sync::Arc;

use tokio::sync::Mutex;

use worklog_core::{ConfigPatch, ConfigStore, SyncConfig};
use worklog_sync::{
    Connect, LocalUpsertSink, RunOutcome, StatusTracker, SyncOrchestrator, SyncStatus,
};

use crate::error::DaemonError;
use crate::scheduler::{Scheduler, TickFn};

struct Control {
    config: ConfigStore,
    scheduler: Scheduler,
}

pub struct SyncEngine {
    control: Mutex<Control>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncEngine {
    pub fn new(
        config: ConfigStore,
        connector: Arc<dyn Connect>,
        sink: Arc<dyn LocalUpsertSink>,
    ) -> Self {
        let status = Arc::new(StatusTracker::new());
        Self::from_orchestrator(config, SyncOrchestrator::new(connector, sink, status))
    }

    /// Host an already configured orchestrator (for example one holding a
    /// [`worklog_sync::RunLock`]).
    pub fn from_orchestrator(config: ConfigStore, orchestrator: SyncOrchestrator) -> Self {
        let orchestrator = Arc::new(orchestrator);
        let scheduler = Scheduler::new(
            orchestrator.status().clone(),
            scheduled_run(orchestrator.clone()),
        );
        Self {
            control: Mutex::new(Control { config, scheduler }),
            orchestrator,
        }
    }

    /// Arm the schedule for the loaded config.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;
        let config = control.config.get();
        control.scheduler.reconcile(&config);
        tracing::info!(
            config = %control.config.path().display(),
            scheduled = control.scheduler.is_armed(),
            "sync engine started",
        );
    }

    /// Cancel the schedule. An in-flight run finishes on its own.
    pub async fn shutdown(&self) {
        self.control.lock().await.scheduler.cancel();
        tracing::info!("sync engine stopped");
    }

    pub async fn config(&self) -> SyncConfig {
        self.control.lock().await.config.get()
    }

    /// Persist `patch` and reconcile the schedule against the result.
    ///
    /// An invalid config is still stored; it just leaves nothing armed.
    pub async fn update_config(&self, patch: ConfigPatch) -> Result<SyncConfig, DaemonError> {
        let mut control = self.control.lock().await;
        let config = control.config.update(patch)?;
        control.scheduler.reconcile(&config);
        if let Err(err) = config.validate() {
            tracing::warn!(error = %err, "stored config is not usable for sync");
        }
        Ok(config)
    }

    /// Run once now with the current config.
    pub async fn force_sync(&self) -> Result<RunOutcome, DaemonError> {
        let config = self.config().await;
        let orchestrator = self.orchestrator.clone();
        let outcome = tokio::task::spawn_blocking(move || orchestrator.start_sync(&config))
            .await
            .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))??;
        Ok(outcome)
    }

    /// Cancel future scheduled runs until the next config update.
    pub async fn stop_sync(&self) {
        self.control.lock().await.scheduler.cancel();
        tracing::info!("schedule paused");
    }

    pub async fn clear_data(&self) -> Result<(), DaemonError> {
        let orchestrator = self.orchestrator.clone();
        tokio::task::spawn_blocking(move || orchestrator.clear_data())
            .await
            .map_err(|err| DaemonError::Protocol(format!("clear task join error: {err}")))??;
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        self.orchestrator.status().snapshot()
    }

    pub async fn is_scheduled(&self) -> bool {
        self.control.lock().await.scheduler.is_armed()
    }
}

/// Tick handler: run on the blocking pool and log the outcome.
fn scheduled_run(orchestrator: Arc<SyncOrchestrator>) -> TickFn {
    Arc::new(move |config: &SyncConfig| {
        let orchestrator = orchestrator.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || match orchestrator.start_sync(&config) {
            Ok(RunOutcome::Completed(summary)) => {
                tracing::info!(
                    records = summary.total(),
                    duration_ms = summary.duration_ms,
                    "scheduled sync completed",
                );
            }
            Ok(RunOutcome::AlreadyRunning) => {
                tracing::info!("scheduled sync skipped; a run is in progress");
            }
            Err(err) => {
                tracing::warn!(error = %err, "scheduled sync failed");
            }
        });
    })
}

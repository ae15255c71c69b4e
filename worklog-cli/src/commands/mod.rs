pub mod clear;
pub mod config;
pub mod daemon;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use worklog_sync::{FileStore, HttpConnector, RunLock, StatusTracker, SyncOrchestrator};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Orchestrator for runs executed in this process, against the file store.
/// Runs and clears hold `~/.worklog/run.lock`, so other processes sharing
/// the store are refused while one is active.
pub(crate) fn local_orchestrator(home: &Path) -> SyncOrchestrator {
    SyncOrchestrator::new(
        Arc::new(HttpConnector),
        Arc::new(FileStore::at_home(home)),
        Arc::new(StatusTracker::new()),
    )
    .with_run_lock(RunLock::at_home(home))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

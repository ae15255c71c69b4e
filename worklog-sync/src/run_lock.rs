//! Cross-process run lock.
//!
//! The orchestrator's in-memory guard only covers one process. When several
//! processes share a store (the daemon and a CLI running offline, or two CLI
//! invocations), they also take an exclusive `flock` on
//! `<home>/.worklog/run.lock` for the duration of a run or clear.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};

use crate::error::SyncError;

pub const RUN_LOCK_FILE: &str = "run.lock";

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.worklog/run.lock`
    pub fn at_home(home: &Path) -> Self {
        Self::new(worklog_core::config_store::worklog_root(home).join(RUN_LOCK_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (creating if needed) the lock file. Nothing is locked yet.
    pub fn open(&self) -> Result<RwLock<File>, SyncError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| self.error(source))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|source| self.error(source))?;
        Ok(RwLock::new(file))
    }

    /// Take the exclusive lock without waiting; `None` when another holder
    /// has it.
    pub fn try_hold<'a>(
        &self,
        file: &'a mut RwLock<File>,
    ) -> Result<Option<RwLockWriteGuard<'a, File>>, SyncError> {
        match file.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(self.error(source)),
        }
    }

    fn error(&self, source: std::io::Error) -> SyncError {
        SyncError::RunLock {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let home = TempDir::new().unwrap();
        let lock = RunLock::at_home(home.path());
        assert!(lock.path().ends_with(".worklog/run.lock"));

        let mut first = lock.open().unwrap();
        let mut second = lock.open().unwrap();

        let held = lock.try_hold(&mut first).unwrap();
        assert!(held.is_some());
        assert!(lock.try_hold(&mut second).unwrap().is_none());

        drop(held);
        assert!(lock.try_hold(&mut second).unwrap().is_some());
    }
}

//! Local document store contract and two implementations.
//!
//! [`FileStore`] persists one JSON document per record at
//! `<home>/.worklog/store/<collection>/<id>.json`. Writes use the same
//! atomic `.tmp` + rename pattern as the config file, so a document is either
//! the previous version or the new one, never a torn write.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::error::{io_err, StoreError};

/// Idempotent create-or-replace store keyed by collection and id.
///
/// Last write wins; no optimistic concurrency.
pub trait LocalUpsertSink: Send + Sync {
    /// Create the document, or fully replace an existing one with the same id.
    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Remove every document in `collection`.
    fn clear(&self, collection: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted ids currently stored in `collection`.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.lock()
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalUpsertSink for MemoryStore {
    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.lock().get(collection).map(BTreeMap::len).unwrap_or(0))
    }

    fn clear(&self, collection: &str) -> Result<(), StoreError> {
        self.lock().remove(collection);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One JSON file per document under `root/<collection>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<home>/.worklog/store`
    pub fn at_home(home: &Path) -> Self {
        Self::new(worklog_core::config_store::worklog_root(home).join("store"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        check_segment(collection)?;
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_segment(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.json")))
    }
}

impl LocalUpsertSink for FileStore {
    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let path = self.document_path(collection, id)?;
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid document path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(collection, id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let dir = self.collection_dir(collection)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(io_err(&dir, err)),
        };
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn clear(&self, collection: &str) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&dir, err)),
        }
    }
}

/// Collection names and ids become path segments.
fn check_segment(segment: &str) -> Result<(), StoreError> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(segment.to_string()))
    }
}

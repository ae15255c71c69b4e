//! One phase of a run: fetch → map → upsert for a single entity kind.
//!
//! Every kind goes through the same upsert-by-external-id path; the kind
//! only selects the resource, the mapper and the collection.

use chrono::Utc;

use worklog_core::EntityKind;

use crate::error::SyncError;
use crate::fetcher::{EntitySource, TimeWindow};
use crate::mapper;
use crate::status::StatusTracker;
use crate::store::LocalUpsertSink;

/// Run the phase for `kind` and return the number of records upserted.
///
/// Upserts are issued one at a time; the first failing upsert fails the
/// phase. Records already written by this phase stay written.
pub fn run_phase(
    kind: EntityKind,
    source: &dyn EntitySource,
    sink: &dyn LocalUpsertSink,
    window: &TimeWindow,
    status: &StatusTracker,
) -> Result<usize, SyncError> {
    let raw = source.fetch(kind, window)?;
    let records = mapper::map(kind, raw, Utc::now())?;
    let total = records.len();
    let collection = kind.collection();

    for (done, record) in records.iter().enumerate() {
        let doc = record.to_document().map_err(|err| SyncError::Store {
            kind,
            collection,
            source: err.into(),
        })?;
        sink.upsert(collection, record.local_id(), &doc)
            .map_err(|source| SyncError::Store {
                kind,
                collection,
                source,
            })?;
        status.record_progress(kind, done + 1, total);
    }

    tracing::info!(kind = %kind, collection, records = total, "phase completed");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    struct StaticSource(Vec<Value>);

    impl EntitySource for StaticSource {
        fn fetch(&self, _kind: EntityKind, _window: &TimeWindow) -> Result<Vec<Value>, SyncError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn phase_upserts_under_local_ids() {
        let source = StaticSource(vec![json!({"id": 1}), json!({"id": 2})]);
        let sink = MemoryStore::new();
        let status = StatusTracker::new();

        let processed = run_phase(
            EntityKind::Projects,
            &source,
            &sink,
            &TimeWindow::ending_today(7),
            &status,
        )
        .expect("phase");

        assert_eq!(processed, 2);
        assert_eq!(
            sink.ids("projects"),
            vec!["project_1".to_string(), "project_2".to_string()]
        );
    }

    #[test]
    fn empty_collection_is_a_successful_phase() {
        let sink = MemoryStore::new();
        let processed = run_phase(
            EntityKind::Activities,
            &StaticSource(vec![]),
            &sink,
            &TimeWindow::ending_today(7),
            &StatusTracker::new(),
        )
        .expect("phase");
        assert_eq!(processed, 0);
        assert_eq!(sink.count("activities").unwrap(), 0);
    }
}

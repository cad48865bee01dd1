//! The explicitly constructed engine object.
//!
//! One `AnalysisEngine` per connected repository session: created at startup
//! with its collaborators, torn down at shutdown, no ambient globals. It
//! wires the record store, runner and publish coordinator together and adds
//! the history reconciliation query.

use std::sync::Arc;

use uuid::Uuid;

use crate::common::error::{AdmissionError, EngineError};
use crate::common::types::{AnalysisResult, HistoryEntry, JobKey, QueueItem};
use crate::kernel::jobs::{
    CancelMode, JobEvent, JobRecordStore, JobRunner, JobSnapshot, RunHandle,
};
use crate::kernel::publish::{CommentEdits, PublishCoordinator, PublishOutcome, PublishSnapshot};
use crate::kernel::traits::{AnalysisContext, BaseAnalyzer, BaseHistoryStore, BasePublisher};

/// The freshest known outcome for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum LatestOutcome {
    /// The live result of the current session.
    Live(AnalysisResult),
    /// No live result; the most recent durable entry.
    Historical(HistoryEntry),
}

pub struct AnalysisEngine {
    store: Arc<JobRecordStore>,
    runner: JobRunner,
    coordinator: PublishCoordinator,
    history: Arc<dyn BaseHistoryStore>,
}

impl AnalysisEngine {
    pub fn new(
        analyzer: Arc<dyn BaseAnalyzer>,
        publisher: Arc<dyn BasePublisher>,
        history: Arc<dyn BaseHistoryStore>,
    ) -> Self {
        let store = Arc::new(JobRecordStore::new());
        let runner = JobRunner::new(Arc::clone(&store), analyzer, Arc::clone(&history));
        let coordinator = PublishCoordinator::new(Arc::clone(&store), publisher);
        Self {
            store,
            runner,
            coordinator,
            history,
        }
    }

    // --- job lifecycle -----------------------------------------------------

    /// Admit a run; no-op returning the active handle if one is in flight.
    pub fn submit(&self, key: JobKey, ctx: AnalysisContext) -> RunHandle {
        self.runner.submit(key, ctx)
    }

    /// Start fresh, superseding any active run for the key.
    pub fn rerun(&self, key: JobKey, ctx: AnalysisContext) -> RunHandle {
        self.runner.rerun(key, ctx)
    }

    /// Cancel the active run, if any. Non-blocking; stale events from the
    /// collaborator are discarded by run-id.
    pub fn cancel(&self, key: JobKey, mode: CancelMode) -> bool {
        self.runner.cancel(key, mode)
    }

    /// Remove all live state for the key: record, steps, result/error and
    /// publish state. History entries are untouched.
    pub fn clear(&self, key: JobKey) {
        self.store.clear(key);
        self.coordinator.clear(key);
    }

    pub fn upsert_queue(&self, items: impl IntoIterator<Item = QueueItem>) {
        self.store.upsert_queue(items);
    }

    pub fn queue(&self) -> Vec<QueueItem> {
        self.store.queue()
    }

    pub fn snapshot(&self, key: JobKey) -> Option<JobSnapshot> {
        self.store.snapshot(key)
    }

    /// Attach an observer: replay of the current state, then live events.
    pub fn subscribe(
        &self,
        key: JobKey,
    ) -> (Vec<JobEvent>, tokio::sync::broadcast::Receiver<JobEvent>) {
        self.store.subscribe(key)
    }

    // --- publish workflow --------------------------------------------------

    pub fn begin_edit(&self, key: JobKey) -> Result<(), AdmissionError> {
        self.coordinator.begin_edit(key)
    }

    pub async fn publish(
        &self,
        key: JobKey,
        edits: &CommentEdits,
    ) -> Result<PublishOutcome, EngineError> {
        self.coordinator.publish(key, edits).await
    }

    pub fn publish_state(&self, key: JobKey) -> PublishSnapshot {
        self.coordinator.snapshot(key)
    }

    /// Forget the posted comment id; the next publish will create anew.
    pub fn clear_comment(&self, key: JobKey) {
        self.coordinator.clear_comment(key);
    }

    // --- history reconciliation --------------------------------------------

    /// The live result if present, else the most recent history entry for
    /// the key, else nothing.
    pub async fn select_latest(&self, key: JobKey) -> Result<Option<LatestOutcome>, EngineError> {
        if let Some(result) = self.store.current_result(key) {
            return Ok(Some(LatestOutcome::Live(result)));
        }
        let mut entries = self.history.list().await.map_err(EngineError::History)?;
        entries.retain(|entry| entry.key == key);
        Ok(entries.pop().map(LatestOutcome::Historical))
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, EngineError> {
        self.history.list().await.map_err(EngineError::History)
    }

    pub async fn remove_history(&self, id: Uuid) -> Result<bool, EngineError> {
        self.history.remove(id).await.map_err(EngineError::History)
    }
}

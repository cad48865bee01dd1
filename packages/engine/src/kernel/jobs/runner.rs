//! Admission control and execution of analysis runs.
//!
//! The `JobRunner` owns concurrency: it enforces at-most-one-active-run per
//! key, spawns one tokio task per admitted run, and drives the analyzer's
//! event stream into the record store tagged with the run's id.
//!
//! ```text
//! submit(key)
//!     │
//!     ├─► already active? return the existing handle (idempotent)
//!     └─► store.begin_run(key)  (clear + new run-id, atomically)
//!             └─► spawn: analyzer.run(key)
//!                     ├─► Step       → store.append_step(key, run_id, step)
//!                     ├─► Completed  → store.set_result + history.append
//!                     └─► Failed     → store.set_error
//! ```
//!
//! Cancellation is advisory to the collaborator (the spawned task is
//! aborted, dropping the stream) and authoritative locally: the store bumps
//! the run-id, so anything the collaborator still emits is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::record::{CancelMode, JobRecordStore};
use crate::common::types::{HistoryEntry, JobKey};
use crate::kernel::traits::{AnalysisContext, AnalysisEvent, BaseAnalyzer, BaseHistoryStore};

/// Handle identifying one admitted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub key: JobKey,
    pub run_id: u64,
}

struct ActiveRun {
    run_id: u64,
    task: JoinHandle<()>,
}

pub struct JobRunner {
    store: Arc<JobRecordStore>,
    analyzer: Arc<dyn BaseAnalyzer>,
    history: Arc<dyn BaseHistoryStore>,
    active: Arc<Mutex<HashMap<JobKey, ActiveRun>>>,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobRecordStore>,
        analyzer: Arc<dyn BaseAnalyzer>,
        history: Arc<dyn BaseHistoryStore>,
    ) -> Self {
        Self {
            store,
            analyzer,
            history,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<JobKey, ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a run for `key`.
    ///
    /// Idempotent while a run is active: returns the existing handle without
    /// touching the in-flight run. A submission on a settled key starts a
    /// fresh run (clearing the previous result or error). The admission check
    /// and the start happen under one lock, so concurrent submits for the
    /// same key admit exactly one run and all receive its handle.
    pub fn submit(&self, key: JobKey, ctx: AnalysisContext) -> RunHandle {
        let mut active = self.lock_active();
        if let Some(run) = active.get(&key) {
            if !run.task.is_finished() {
                debug!(key = %key, run_id = run.run_id, "submit is a no-op, run already active");
                return RunHandle {
                    key,
                    run_id: run.run_id,
                };
            }
        }
        self.start(&mut active, key, ctx)
    }

    /// Force a fresh run for `key`, superseding any active one.
    pub fn rerun(&self, key: JobKey, ctx: AnalysisContext) -> RunHandle {
        let mut active = self.lock_active();
        if let Some(run) = active.remove(&key) {
            run.task.abort();
            // Invalidate before restarting so stragglers from the aborted
            // task can never land in the new run's StepLog.
            self.store.cancel_run(key, run.run_id, CancelMode::Requeue);
        }
        self.start(&mut active, key, ctx)
    }

    /// Cancel the active run for `key`, if any.
    ///
    /// Returns true if a run was cancelled. The collaborator task is aborted
    /// best-effort; correctness comes from the store invalidating the run-id.
    pub fn cancel(&self, key: JobKey, mode: CancelMode) -> bool {
        let Some(run) = self.lock_active().remove(&key) else {
            return false;
        };
        run.task.abort();
        let cancelled = self.store.cancel_run(key, run.run_id, mode);
        if cancelled {
            info!(key = %key, run_id = run.run_id, ?mode, "run cancelled");
        }
        cancelled
    }

    // Caller holds the `active` lock; begin_run, spawn and insert happen
    // before any other submit/rerun can observe the map.
    fn start(
        &self,
        active: &mut HashMap<JobKey, ActiveRun>,
        key: JobKey,
        ctx: AnalysisContext,
    ) -> RunHandle {
        let run_id = self.store.begin_run(key);
        info!(key = %key, run_id, "analysis run starting");

        let store = Arc::clone(&self.store);
        let analyzer = Arc::clone(&self.analyzer);
        let history = Arc::clone(&self.history);
        let active_map = Arc::clone(&self.active);

        let task = tokio::spawn(async move {
            drive_run(key, run_id, ctx, store, analyzer, history).await;
            let mut active = active_map.lock().unwrap_or_else(|e| e.into_inner());
            if active.get(&key).map(|run| run.run_id) == Some(run_id) {
                active.remove(&key);
            }
        });

        active.insert(key, ActiveRun { run_id, task });
        RunHandle { key, run_id }
    }
}

async fn drive_run(
    key: JobKey,
    run_id: u64,
    ctx: AnalysisContext,
    store: Arc<JobRecordStore>,
    analyzer: Arc<dyn BaseAnalyzer>,
    history: Arc<dyn BaseHistoryStore>,
) {
    let mut stream = match analyzer.run(key, ctx).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(key = %key, run_id, error = %e, "analyzer refused to start");
            store.set_error(key, run_id, e.to_string());
            return;
        }
    };

    let mut settled = false;
    while let Some(event) = stream.next().await {
        match event {
            AnalysisEvent::Step(step) => {
                if !store.append_step(key, run_id, step) {
                    // Superseded mid-flight; stop driving the stale stream.
                    return;
                }
            }
            AnalysisEvent::Completed(result) => {
                settled = true;
                if store.set_result(key, run_id, result.clone()) {
                    info!(key = %key, run_id, verdict = %result.verdict, "analysis run completed");
                    // History is best-effort: a persistence failure must not
                    // fail the run the user just watched succeed.
                    if let Err(e) = history.append(HistoryEntry::new(key, result)).await {
                        warn!(key = %key, error = %e, "failed to record history entry");
                    }
                }
                break;
            }
            AnalysisEvent::Failed(message) => {
                settled = true;
                if store.set_error(key, run_id, message.clone()) {
                    warn!(key = %key, run_id, error = %message, "analysis run failed");
                }
                break;
            }
        }
    }

    if !settled {
        warn!(key = %key, run_id, "analysis stream ended without a terminal event");
        store.set_error(key, run_id, "analysis ended without a result");
    }
}

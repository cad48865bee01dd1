//! The authoritative per-key job record store.
//!
//! Owns QueueItem/StepLog/Result/JobError for every key and enforces the
//! core invariants:
//! - at most one of result/error is set at any instant (each setter clears
//!   the other),
//! - steps are appended only while the key is `running`,
//! - events tagged with a stale run-id are dropped, never applied.
//!
//! All mutations go through one mutex and publish their [`JobEvent`] while
//! that mutex is held, so observers see a total order per key and
//! `subscribe` can hand out a gap-free snapshot + live receiver.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::JobEvent;
use super::hub::ProgressHub;
use crate::common::types::{AnalysisResult, JobKey, JobStatus, QueueItem, Step};

/// Disposition of a cancelled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMode {
    /// Put the key back to `queued`; steps are kept for diagnostics.
    Requeue,
    /// Record a terminal `failed("cancelled")`.
    Fail,
}

#[derive(Debug, Clone, Default)]
struct JobRecord {
    status: JobStatus,
    run_id: u64,
    steps: Vec<Step>,
    result: Option<AnalysisResult>,
    error: Option<String>,
}

/// Copy-on-read view of one key's record.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub key: JobKey,
    pub status: JobStatus,
    pub run_id: u64,
    pub steps: Vec<Step>,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
}

pub struct JobRecordStore {
    records: Mutex<HashMap<JobKey, JobRecord>>,
    hub: ProgressHub,
}

impl JobRecordStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            hub: ProgressHub::new(),
        }
    }

    /// Create a store whose broadcast channels hold `capacity` events.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            hub: ProgressHub::with_capacity(capacity),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, JobRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed or supersede the admission view for a set of keys.
    ///
    /// A key that is currently `running` is never superseded from here; the
    /// upsert for it is dropped with a warning. Only `cancel_run` and
    /// `begin_run` may displace a live run.
    pub fn upsert_queue(&self, items: impl IntoIterator<Item = QueueItem>) {
        let mut records = self.lock();
        for item in items {
            let record = records.entry(item.key).or_default();
            if record.status == JobStatus::Running {
                warn!(
                    key = %item.key,
                    requested = %item.status,
                    "dropping queue upsert for a running key"
                );
                continue;
            }
            record.status = item.status;
            self.hub.publish(JobEvent::Queued { item });
        }
    }

    /// Start a fresh run for `key`: clear steps/result/error, bump the
    /// run-id, set status to `running`.
    ///
    /// The clear and the `Started` event are one atomic mutation, so the
    /// clear always happens-before any event of the new run-id becomes
    /// visible to observers.
    pub fn begin_run(&self, key: JobKey) -> u64 {
        let mut records = self.lock();
        let record = records.entry(key).or_default();
        record.run_id += 1;
        record.status = JobStatus::Running;
        record.steps.clear();
        record.result = None;
        record.error = None;
        let run_id = record.run_id;
        self.hub.publish(JobEvent::Started { key, run_id });
        run_id
    }

    /// Append a step to the current run. Returns false (and drops the step)
    /// if `run_id` is stale or the key is not running.
    pub fn append_step(&self, key: JobKey, run_id: u64, step: Step) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&key) else {
            warn!(key = %key, run_id, "dropping step for unknown key");
            return false;
        };
        if record.run_id != run_id || record.status != JobStatus::Running {
            warn!(
                key = %key,
                run_id,
                current_run_id = record.run_id,
                status = %record.status,
                "dropping stale step event"
            );
            return false;
        }
        record.steps.push(step.clone());
        debug!(key = %key, run_id, label = %step.label, "step appended");
        self.hub.publish(JobEvent::StepAppended { key, run_id, step });
        true
    }

    /// Record terminal success. Clears any prior error for the key.
    pub fn set_result(&self, key: JobKey, run_id: u64, result: AnalysisResult) -> bool {
        self.settle(key, run_id, Settle::Result(result))
    }

    /// Record terminal failure. Clears any prior result for the key.
    pub fn set_error(&self, key: JobKey, run_id: u64, message: impl Into<String>) -> bool {
        self.settle(key, run_id, Settle::Error(message.into()))
    }

    fn settle(&self, key: JobKey, run_id: u64, outcome: Settle) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&key) else {
            warn!(key = %key, run_id, "dropping terminal event for unknown key");
            return false;
        };
        if record.run_id != run_id || record.status != JobStatus::Running {
            warn!(
                key = %key,
                run_id,
                current_run_id = record.run_id,
                status = %record.status,
                "dropping stale terminal event"
            );
            return false;
        }
        match outcome {
            Settle::Result(result) => {
                record.status = JobStatus::Completed;
                record.result = Some(result.clone());
                record.error = None;
                self.hub.publish(JobEvent::Completed { key, run_id, result });
            }
            Settle::Error(error) => {
                record.status = JobStatus::Failed;
                record.error = Some(error.clone());
                record.result = None;
                self.hub.publish(JobEvent::Failed { key, run_id, error });
            }
        }
        true
    }

    /// Locally cancel the current run: bump the run-id so stragglers from
    /// the superseded run are dropped, and settle the status per `mode`.
    ///
    /// Returns false if `run_id` is not the active run (already settled or
    /// already superseded).
    pub fn cancel_run(&self, key: JobKey, run_id: u64, mode: CancelMode) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&key) else {
            return false;
        };
        if record.run_id != run_id || record.status != JobStatus::Running {
            return false;
        }
        record.run_id += 1;
        let status = match mode {
            CancelMode::Requeue => JobStatus::Queued,
            CancelMode::Fail => JobStatus::Failed,
        };
        record.status = status;
        if mode == CancelMode::Fail {
            record.error = Some("cancelled".to_string());
            record.result = None;
        }
        self.hub.publish(JobEvent::Cancelled { key, run_id, status });
        true
    }

    /// Remove the key's record entirely (steps, result, error).
    pub fn clear(&self, key: JobKey) {
        let mut records = self.lock();
        if records.remove(&key).is_some() {
            self.hub.publish(JobEvent::Cleared { key });
        }
    }

    pub fn snapshot(&self, key: JobKey) -> Option<JobSnapshot> {
        let records = self.lock();
        records.get(&key).map(|record| to_snapshot(key, record))
    }

    /// Current admission view, sorted by key.
    pub fn queue(&self) -> Vec<QueueItem> {
        let records = self.lock();
        let mut items: Vec<QueueItem> = records
            .iter()
            .map(|(key, record)| QueueItem {
                key: *key,
                status: record.status,
            })
            .collect();
        items.sort_by_key(|item| item.key);
        items
    }

    /// The live result for `key`, if its last run completed successfully.
    pub fn current_result(&self, key: JobKey) -> Option<AnalysisResult> {
        let records = self.lock();
        records.get(&key).and_then(|record| record.result.clone())
    }

    /// Attach an observer: returns a replay of the key's current state as
    /// ordered events, plus a live receiver for everything after it.
    ///
    /// Snapshot and receiver are created under the same lock that serializes
    /// publishes, so the observer sees no gap and no duplicates between the
    /// replay and the live stream.
    pub fn subscribe(&self, key: JobKey) -> (Vec<JobEvent>, broadcast::Receiver<JobEvent>) {
        let records = self.lock();
        let replay = records
            .get(&key)
            .map(|record| replay_events(key, record))
            .unwrap_or_default();
        let rx = self.hub.subscribe(key);
        (replay, rx)
    }

    /// Drop broadcast channels that lost all their subscribers.
    pub fn cleanup_channels(&self) {
        self.hub.cleanup();
    }
}

impl Default for JobRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

enum Settle {
    Result(AnalysisResult),
    Error(String),
}

fn to_snapshot(key: JobKey, record: &JobRecord) -> JobSnapshot {
    JobSnapshot {
        key,
        status: record.status,
        run_id: record.run_id,
        steps: record.steps.clone(),
        result: record.result.clone(),
        error: record.error.clone(),
    }
}

fn replay_events(key: JobKey, record: &JobRecord) -> Vec<JobEvent> {
    // A key that was only ever queued replays as its admission row.
    if record.run_id == 0 {
        return vec![JobEvent::Queued {
            item: QueueItem {
                key,
                status: record.status,
            },
        }];
    }

    let run_id = record.run_id;
    let mut events = Vec::with_capacity(record.steps.len() + 2);
    events.push(JobEvent::Started { key, run_id });
    for step in &record.steps {
        events.push(JobEvent::StepAppended {
            key,
            run_id,
            step: step.clone(),
        });
    }
    if let Some(result) = &record.result {
        events.push(JobEvent::Completed {
            key,
            run_id,
            result: result.clone(),
        });
    } else if let Some(error) = &record.error {
        events.push(JobEvent::Failed {
            key,
            run_id,
            error: error.clone(),
        });
    }
    events
}

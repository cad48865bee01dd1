use serde::{Deserialize, Serialize};

use crate::common::types::{AnalysisResult, JobKey, JobStatus, QueueItem, Step};

/// Job lifecycle events.
///
/// These events represent facts about the job lifecycle, not commands. Every
/// store mutation emits exactly one of them, so an observer that replays the
/// snapshot and then follows the live stream sees the full ordered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// The admission view for a key was created or superseded.
    Queued { item: QueueItem },

    /// A new run started; steps, result and error were cleared first.
    Started { key: JobKey, run_id: u64 },

    /// One progress step was appended to the run's StepLog.
    StepAppended { key: JobKey, run_id: u64, step: Step },

    /// The run finished successfully.
    Completed {
        key: JobKey,
        run_id: u64,
        result: AnalysisResult,
    },

    /// The run finished with an error.
    Failed {
        key: JobKey,
        run_id: u64,
        error: String,
    },

    /// The run was cancelled locally; `status` is the disposition chosen by
    /// the caller (queued again, or failed).
    Cancelled {
        key: JobKey,
        run_id: u64,
        status: JobStatus,
    },

    /// The key's record was removed entirely.
    Cleared { key: JobKey },
}

impl JobEvent {
    /// The key this event belongs to.
    pub fn key(&self) -> JobKey {
        match self {
            JobEvent::Queued { item } => item.key,
            JobEvent::Started { key, .. }
            | JobEvent::StepAppended { key, .. }
            | JobEvent::Completed { key, .. }
            | JobEvent::Failed { key, .. }
            | JobEvent::Cancelled { key, .. }
            | JobEvent::Cleared { key } => *key,
        }
    }

    /// True for events after which no further steps are accepted for the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::Completed { .. } | JobEvent::Failed { .. } | JobEvent::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Complexity, Verdict};

    fn sample_result() -> AnalysisResult {
        AnalysisResult::builder()
            .verdict(Verdict::Confirmed)
            .confidence(92u8)
            .complexity(Complexity::Moderate)
            .reasoning("reproduced")
            .build()
    }

    #[test]
    fn event_started_serializes() {
        let event = JobEvent::Started {
            key: JobKey::issue(42),
            run_id: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Started"));
        assert!(json.contains("42"));
    }

    #[test]
    fn event_step_serializes() {
        let event = JobEvent::StepAppended {
            key: JobKey::pull_request(7),
            run_id: 1,
            step: Step::new("fetching diff"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StepAppended"));
        assert!(json.contains("fetching diff"));
    }

    #[test]
    fn event_completed_serializes() {
        let event = JobEvent::Completed {
            key: JobKey::issue(42),
            run_id: 1,
            result: sample_result(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Completed"));
        assert!(json.contains("confirmed"));
    }

    #[test]
    fn event_key_projection() {
        let key = JobKey::issue(9);
        assert_eq!(JobEvent::Cleared { key }.key(), key);
        assert_eq!(
            JobEvent::Failed {
                key,
                run_id: 2,
                error: "rate limited".into()
            }
            .key(),
            key
        );
    }

    #[test]
    fn terminality() {
        let key = JobKey::issue(1);
        assert!(JobEvent::Failed {
            key,
            run_id: 1,
            error: "e".into()
        }
        .is_terminal());
        assert!(!JobEvent::Started { key, run_id: 1 }.is_terminal());
        assert!(!JobEvent::Cleared { key }.is_terminal());
    }

    #[test]
    fn events_roundtrip_serialize() {
        let key = JobKey::pull_request(3);
        let events = vec![
            JobEvent::Queued {
                item: QueueItem {
                    key,
                    status: JobStatus::Queued,
                },
            },
            JobEvent::Started { key, run_id: 1 },
            JobEvent::StepAppended {
                key,
                run_id: 1,
                step: Step::with_detail("analyzing", "3 files"),
            },
            JobEvent::Completed {
                key,
                run_id: 1,
                result: sample_result(),
            },
            JobEvent::Failed {
                key,
                run_id: 2,
                error: "rate limited".into(),
            },
            JobEvent::Cancelled {
                key,
                run_id: 3,
                status: JobStatus::Failed,
            },
            JobEvent::Cleared { key },
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let _: JobEvent = serde_json::from_str(&json).unwrap();
        }
    }
}

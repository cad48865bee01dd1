//! In-process engine for AI-driven GitHub issue validation and PR review.
//!
//! Accepts analysis requests for discrete targets (an issue or PR number),
//! runs them as independent cancellable jobs, streams ordered progress to
//! observers with replay-on-attach, caches the terminal result or error,
//! reconciles against a durable history store, and drives an idempotent
//! publish workflow that posts the verdict as a GitHub comment without ever
//! duplicating it.
//!
//! The AI reasoning, the GitHub API client and the host UI live behind the
//! [`kernel::traits`] seams; this crate owns only the lifecycle.
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine_core::{AnalysisContext, AnalysisEngine, FileHistoryStore, JobKey};
//! # use engine_core::{BaseAnalyzer, BasePublisher};
//! # fn collaborators() -> (Arc<dyn BaseAnalyzer>, Arc<dyn BasePublisher>) { unimplemented!() }
//!
//! # async fn demo() {
//! let (analyzer, publisher) = collaborators();
//! let history = Arc::new(FileHistoryStore::new("history.jsonl"));
//! let engine = AnalysisEngine::new(analyzer, publisher, history);
//!
//! let handle = engine.submit(JobKey::issue(42), AnalysisContext::for_repo("acme/widgets"));
//! let (replay, live) = engine.subscribe(handle.key);
//! # let _ = (replay, live);
//! # }
//! ```

pub mod common;
pub mod kernel;

pub use common::error::{AdmissionError, EngineError};
pub use common::types::{
    AnalysisResult, Complexity, Evidence, HistoryEntry, JobKey, JobStatus, PublishPhase,
    QueueItem, Step, TargetKind, Verdict,
};
pub use kernel::engine::{AnalysisEngine, LatestOutcome};
pub use kernel::history::{FileHistoryStore, InMemoryHistoryStore};
pub use kernel::jobs::{
    CancelMode, JobEvent, JobRecordStore, JobRunner, JobSnapshot, ProgressHub, RunHandle,
};
pub use kernel::publish::{
    render_comment, CommentEdits, PublishCoordinator, PublishOutcome, PublishSnapshot,
};
pub use kernel::traits::{
    AnalysisContext, AnalysisEvent, AnalysisStream, BaseAnalyzer, BaseHistoryStore, BasePublisher,
    PostedComment,
};

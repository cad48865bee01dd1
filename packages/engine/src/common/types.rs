//! Shared vocabulary for the analysis engine.
//!
//! These types are pure data: the lifecycle rules that govern them live in
//! the kernel (`JobRecordStore`, `JobRunner`, `PublishCoordinator`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// What kind of GitHub target a job analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Issue,
    PullRequest,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Issue => write!(f, "issue"),
            TargetKind::PullRequest => write!(f, "pr"),
        }
    }
}

/// Identifier of one analysis target within the connected repository.
///
/// Unique per repository session; used as the map key for job records,
/// publish state and history lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub kind: TargetKind,
    pub number: u64,
}

impl JobKey {
    pub fn issue(number: u64) -> Self {
        Self {
            kind: TargetKind::Issue,
            number,
        }
    }

    pub fn pull_request(number: u64) -> Self {
        Self {
            kind: TargetKind::PullRequest,
            number,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.number)
    }
}

/// Admission-view status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One row of the admission view. Superseded, never duplicated, when the
/// same key is submitted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub key: JobKey,
    pub status: JobStatus,
}

/// One progress step emitted by an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl Step {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_detail(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }
}

/// Verdict of an analysis run.
///
/// Issue validation uses the full range; PR review maps pass/fail onto
/// `Confirmed`/`Invalid` and carries its score in
/// [`AnalysisResult::quality_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Confirmed,
    Likely,
    Uncertain,
    Unlikely,
    Invalid,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Confirmed => write!(f, "confirmed"),
            Verdict::Likely => write!(f, "likely"),
            Verdict::Uncertain => write!(f, "uncertain"),
            Verdict::Unlikely => write!(f, "unlikely"),
            Verdict::Invalid => write!(f, "invalid"),
        }
    }
}

/// Estimated complexity of addressing the analyzed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Moderate,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Trivial => write!(f, "trivial"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// A file the analysis points at as supporting its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub path: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub snippet: Option<String>,
}

/// Terminal success payload of a run. At most one per key at a time; a new
/// terminal success replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct AnalysisResult {
    pub verdict: Verdict,
    /// 0-100.
    pub confidence: u8,
    pub complexity: Complexity,
    /// Review-only quality score, 0-100.
    #[builder(default)]
    pub quality_score: Option<u8>,
    pub reasoning: String,
    #[builder(default)]
    pub evidence: Vec<Evidence>,
}

/// Durable record of a past terminal result. Immutable once written;
/// deletable wholesale by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub key: JobKey,
    pub result: AnalysisResult,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(key: JobKey, result: AnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            result,
            recorded_at: Utc::now(),
        }
    }
}

/// Per-key phase of the publish workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    #[default]
    Idle,
    Editing,
    Publishing,
    Posted,
}

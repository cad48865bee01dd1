// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no analysis logic. The actual AI
// reasoning, the GitHub API client and the durable storage backend all live
// behind these seams and are supplied by the host.
//
// Naming convention: Base* for trait names (e.g., BaseAnalyzer, BasePublisher)

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::types::{AnalysisResult, HistoryEntry, JobKey, Step};

// =============================================================================
// Analysis Trait (Infrastructure - runs one AI analysis as an event stream)
// =============================================================================

/// Context handed to the analyzer for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// `owner/repo` of the connected repository.
    pub repo: String,
    /// Free-form host hints (model choice, prompt knobs). Opaque to the engine.
    #[serde(default)]
    pub hints: serde_json::Value,
}

impl AnalysisContext {
    pub fn for_repo(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            hints: serde_json::Value::Null,
        }
    }
}

/// One item of the analyzer's progress stream.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    Step(Step),
    /// Terminal success. No further steps are accepted for this run.
    Completed(AnalysisResult),
    /// Terminal failure with a human-readable message.
    Failed(String),
}

pub type AnalysisStream = BoxStream<'static, AnalysisEvent>;

#[async_trait]
pub trait BaseAnalyzer: Send + Sync {
    /// Start one analysis run for `key`.
    ///
    /// The stream ends at (or shortly after) the terminal event. Dropping it
    /// cancels the run best-effort; the engine does not depend on the
    /// collaborator stopping promptly.
    async fn run(&self, key: JobKey, ctx: AnalysisContext) -> Result<AnalysisStream>;
}

// =============================================================================
// Publish Trait (Infrastructure - GitHub comment create/update)
// =============================================================================

/// Remote identity of a posted comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedComment {
    pub id: u64,
    pub url: String,
}

#[async_trait]
pub trait BasePublisher: Send + Sync {
    /// Post a new comment on the target. Returns its remote identity.
    async fn create_comment(&self, key: JobKey, body: &str) -> Result<PostedComment>;

    /// Replace the body of an existing comment. Returns its url.
    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<String>;
}

// =============================================================================
// History Trait (Infrastructure - durable record of terminal outcomes)
// =============================================================================

#[async_trait]
pub trait BaseHistoryStore: Send + Sync {
    /// Append one entry. Entries are immutable once written.
    async fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// All entries, oldest first.
    async fn list(&self) -> Result<Vec<HistoryEntry>>;

    /// Delete one entry wholesale. Returns false if the id is unknown.
    async fn remove(&self, id: Uuid) -> Result<bool>;
}

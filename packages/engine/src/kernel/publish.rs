//! Publish workflow: turning a terminal result into a GitHub comment.
//!
//! Per-key state machine:
//!
//! ```text
//! idle ──begin_edit──► editing ──publish──► publishing ──ack──► posted
//!                         ▲                     │                  │
//!                         └──────── fail ───────┘   begin_edit ◄───┘
//! ```
//!
//! The remembered `comment_id` is what makes re-publish idempotent: once it
//! is set, every publish for that key is an update, never a second create.
//! A failed publish returns to `editing` (never silently to `idle`) so the
//! user's draft survives the retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};
use typed_builder::TypedBuilder;

use crate::common::error::{AdmissionError, EngineError};
use crate::common::types::{AnalysisResult, JobKey, PublishPhase, TargetKind};
use crate::kernel::jobs::JobRecordStore;
use crate::kernel::traits::BasePublisher;

/// Caller-supplied overrides for individual comment sections, used to let a
/// user hand-edit before posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
pub struct CommentEdits {
    pub approach: Option<String>,
    pub reasoning: Option<String>,
    pub feature_details: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct PublishRecord {
    phase: PublishPhase,
    comment_id: Option<u64>,
    comment_url: Option<String>,
    last_error: Option<String>,
}

/// Copy-on-read view of one key's publish state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSnapshot {
    pub phase: PublishPhase,
    pub comment_id: Option<u64>,
    pub comment_url: Option<String>,
    pub last_error: Option<String>,
}

/// What a `publish` call resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted { comment_id: u64, url: String },
    /// Another publish for this key was already in flight; nothing was sent.
    AlreadyInFlight,
}

pub struct PublishCoordinator {
    store: Arc<JobRecordStore>,
    publisher: Arc<dyn BasePublisher>,
    records: Mutex<HashMap<JobKey, PublishRecord>>,
}

impl PublishCoordinator {
    pub fn new(store: Arc<JobRecordStore>, publisher: Arc<dyn BasePublisher>) -> Self {
        Self {
            store,
            publisher,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, PublishRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter `editing` for `key`. Allowed from any phase except `publishing`.
    pub fn begin_edit(&self, key: JobKey) -> Result<(), AdmissionError> {
        let mut records = self.lock();
        let record = records.entry(key).or_default();
        if record.phase == PublishPhase::Publishing {
            return Err(AdmissionError::PublishInFlight(key));
        }
        record.phase = PublishPhase::Editing;
        Ok(())
    }

    /// Render the comment for `key`'s live result and post it.
    ///
    /// Creates the comment on first publish, updates it ever after. At most
    /// one publish per key is in flight; a concurrent call returns
    /// [`PublishOutcome::AlreadyInFlight`] without touching the collaborator.
    pub async fn publish(
        &self,
        key: JobKey,
        edits: &CommentEdits,
    ) -> Result<PublishOutcome, EngineError> {
        // The result must have landed in the store before it can be posted.
        let Some(result) = self.store.current_result(key) else {
            return Err(AdmissionError::NoResult(key).into());
        };
        let body = render_comment(key, &result, edits);

        // Reserve the in-flight slot before awaiting the collaborator.
        let existing = {
            let mut records = self.lock();
            let record = records.entry(key).or_default();
            if record.phase == PublishPhase::Publishing {
                return Ok(PublishOutcome::AlreadyInFlight);
            }
            record.phase = PublishPhase::Publishing;
            record.comment_id
        };

        let outcome = match existing {
            Some(comment_id) => self
                .publisher
                .update_comment(comment_id, &body)
                .await
                .map(|url| (comment_id, url)),
            None => self
                .publisher
                .create_comment(key, &body)
                .await
                .map(|posted| (posted.id, posted.url)),
        };

        let mut records = self.lock();
        // The key may have been cleared while the call was in flight; the
        // comment outcome is still reported, but no record is resurrected.
        let Some(record) = records.get_mut(&key) else {
            return match outcome {
                Ok((comment_id, url)) => {
                    warn!(key = %key, comment_id, "publish state cleared mid-flight");
                    Ok(PublishOutcome::Posted { comment_id, url })
                }
                Err(e) => Err(EngineError::Publisher(e)),
            };
        };
        match outcome {
            Ok((comment_id, url)) => {
                record.phase = PublishPhase::Posted;
                record.comment_id = Some(comment_id);
                record.comment_url = Some(url.clone());
                record.last_error = None;
                info!(key = %key, comment_id, updated = existing.is_some(), "comment published");
                Ok(PublishOutcome::Posted { comment_id, url })
            }
            Err(e) => {
                // Back to editing, keeping the draft and the result.
                record.phase = PublishPhase::Editing;
                record.last_error = Some(e.to_string());
                warn!(key = %key, error = %e, "publish failed");
                Err(EngineError::Publisher(e))
            }
        }
    }

    pub fn snapshot(&self, key: JobKey) -> PublishSnapshot {
        let records = self.lock();
        let record = records.get(&key).cloned().unwrap_or_default();
        PublishSnapshot {
            phase: record.phase,
            comment_id: record.comment_id,
            comment_url: record.comment_url,
            last_error: record.last_error,
        }
    }

    /// Forget the remembered comment id, so the next publish creates a new
    /// comment. Explicit by design: nothing else ever clears it.
    pub fn clear_comment(&self, key: JobKey) {
        let mut records = self.lock();
        if let Some(record) = records.get_mut(&key) {
            record.comment_id = None;
            record.comment_url = None;
        }
    }

    /// Drop all publish state for `key` (used when the key's record is
    /// cleared for a fresh run).
    pub fn clear(&self, key: JobKey) {
        self.lock().remove(&key);
    }
}

/// Build the markdown comment body from a result plus section overrides.
pub fn render_comment(key: JobKey, result: &AnalysisResult, edits: &CommentEdits) -> String {
    let title = match key.kind {
        TargetKind::Issue => "Issue validation",
        TargetKind::PullRequest => "Pull request review",
    };

    let mut sections = Vec::new();
    sections.push(format!("## {title}: {}", result.verdict));

    let mut meta = format!(
        "**Confidence:** {}% | **Complexity:** {}",
        result.confidence, result.complexity
    );
    if let Some(score) = result.quality_score {
        meta.push_str(&format!(" | **Quality:** {score}/100"));
    }
    sections.push(meta);

    let reasoning = edits.reasoning.as_deref().unwrap_or(&result.reasoning);
    sections.push(format!("### Reasoning\n{reasoning}"));

    if let Some(approach) = &edits.approach {
        sections.push(format!("### Approach\n{approach}"));
    }
    if let Some(details) = &edits.feature_details {
        sections.push(format!("### Feature details\n{details}"));
    }

    if !result.evidence.is_empty() {
        let mut files = String::from("### Affected files\n");
        for evidence in &result.evidence {
            files.push_str(&format!("- `{}`: {}\n", evidence.path, evidence.reason));
            if let Some(snippet) = &evidence.snippet {
                files.push_str(&format!("\n```\n{snippet}\n```\n"));
            }
        }
        sections.push(files.trim_end().to_string());
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Complexity, Evidence, Verdict};

    fn sample_result() -> AnalysisResult {
        AnalysisResult::builder()
            .verdict(Verdict::Confirmed)
            .confidence(92u8)
            .complexity(Complexity::Moderate)
            .reasoning("reproduced against main")
            .evidence(vec![Evidence {
                path: "src/parser.rs".into(),
                reason: "off-by-one in span tracking".into(),
                snippet: Some("let end = start + len;".into()),
            }])
            .build()
    }

    #[test]
    fn render_includes_verdict_and_meta() {
        let body = render_comment(JobKey::issue(42), &sample_result(), &CommentEdits::default());
        assert!(body.contains("## Issue validation: confirmed"));
        assert!(body.contains("**Confidence:** 92%"));
        assert!(body.contains("reproduced against main"));
        assert!(body.contains("`src/parser.rs`"));
    }

    #[test]
    fn render_honors_section_overrides() {
        let edits = CommentEdits::builder()
            .reasoning("hand-edited reasoning")
            .approach("patch the span math")
            .build();
        let body = render_comment(JobKey::issue(42), &sample_result(), &edits);
        assert!(body.contains("hand-edited reasoning"));
        assert!(!body.contains("reproduced against main"));
        assert!(body.contains("### Approach\npatch the span math"));
    }

    #[test]
    fn render_review_title_and_quality() {
        let result = AnalysisResult::builder()
            .verdict(Verdict::Likely)
            .confidence(80u8)
            .complexity(Complexity::Trivial)
            .quality_score(Some(88u8))
            .reasoning("small diff, tests included")
            .build();
        let body = render_comment(JobKey::pull_request(7), &result, &CommentEdits::default());
        assert!(body.contains("## Pull request review: likely"));
        assert!(body.contains("**Quality:** 88/100"));
    }
}

//! Scripted and mock collaborators for exercising the engine in tests.

pub use crate::kernel::history::InMemoryHistoryStore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::common::types::{AnalysisResult, JobKey, Step};
use crate::kernel::traits::{
    AnalysisContext, AnalysisEvent, AnalysisStream, BaseAnalyzer, BasePublisher, PostedComment,
};

/// One scripted analyzer run: the events it will emit, in order.
#[derive(Clone, Default)]
pub struct Script {
    events: Vec<AnalysisEvent>,
    hold_open: bool,
    pace: Option<Duration>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, label: &str) -> Self {
        self.events.push(AnalysisEvent::Step(Step::new(label)));
        self
    }

    pub fn completes(mut self, result: AnalysisResult) -> Self {
        self.events.push(AnalysisEvent::Completed(result));
        self
    }

    pub fn fails(mut self, message: &str) -> Self {
        self.events.push(AnalysisEvent::Failed(message.to_string()));
        self
    }

    /// Keep the stream open after the scripted events, so the run stays
    /// `running` until it is cancelled or superseded.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Sleep `pace` before each event.
    pub fn paced(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

/// Analyzer that plays back pre-registered scripts, FIFO per key.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    scripts: RwLock<HashMap<JobKey, Vec<Script>>>,
    runs: RwLock<Vec<JobKey>>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next script for `key`.
    pub fn script(&self, key: JobKey, script: Script) {
        self.scripts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .push(script);
    }

    /// How many runs were started for `key`.
    pub fn run_count(&self, key: JobKey) -> usize {
        self.runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|k| **k == key)
            .count()
    }
}

#[async_trait]
impl BaseAnalyzer for ScriptedAnalyzer {
    async fn run(&self, key: JobKey, _ctx: AnalysisContext) -> Result<AnalysisStream> {
        self.runs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(key);

        let script = {
            let mut scripts = self.scripts.write().unwrap_or_else(|e| e.into_inner());
            match scripts.get_mut(&key) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => return Err(anyhow!("no script registered for {key}")),
            }
        };

        let base = stream::iter(script.events);
        let base: AnalysisStream = match script.pace {
            Some(pace) => base
                .then(move |event| async move {
                    tokio::time::sleep(pace).await;
                    event
                })
                .boxed(),
            None => base.boxed(),
        };

        if script.hold_open {
            Ok(base.chain(stream::pending()).boxed())
        } else {
            Ok(base)
        }
    }
}

/// Publisher that records every create/update call.
pub struct MockPublisher {
    creates: RwLock<Vec<(JobKey, String)>>,
    updates: RwLock<Vec<(u64, String)>>,
    fail_next: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
    next_id: AtomicU64,
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            creates: RwLock::new(Vec::new()),
            updates: RwLock::new(Vec::new()),
            fail_next: RwLock::new(false),
            delay: RwLock::new(None),
            next_id: AtomicU64::new(100),
        }
    }

    pub fn create_count(&self) -> usize {
        self.creates.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_create_body(&self) -> Option<String> {
        self.creates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|(_, body)| body.clone())
    }

    pub fn last_update(&self) -> Option<(u64, String)> {
        self.updates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Make the next create/update call fail with a transport error.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Delay every call, to hold the coordinator in `publishing`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    async fn before_call(&self) -> Result<()> {
        let delay = *self.delay.read().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut fail = self.fail_next.write().unwrap_or_else(|e| e.into_inner());
        if *fail {
            *fail = false;
            return Err(anyhow!("simulated transport failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl BasePublisher for MockPublisher {
    async fn create_comment(&self, key: JobKey, body: &str) -> Result<PostedComment> {
        self.before_call().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.creates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((key, body.to_string()));
        Ok(PostedComment {
            id,
            url: format!("https://github.example/comments/{id}"),
        })
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<String> {
        self.before_call().await?;
        self.updates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((comment_id, body.to_string()));
        Ok(format!("https://github.example/comments/{comment_id}"))
    }
}

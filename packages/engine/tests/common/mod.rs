//! Shared harness for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use engine_core::kernel::jobs::testing::{InMemoryHistoryStore, MockPublisher, ScriptedAnalyzer};
use engine_core::{AnalysisEngine, AnalysisResult, Complexity, JobEvent, Verdict};
use tokio::sync::broadcast;

/// Engine wired to scripted/mock collaborators.
pub struct TestEngine {
    pub engine: Arc<AnalysisEngine>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub publisher: Arc<MockPublisher>,
    pub history: Arc<InMemoryHistoryStore>,
}

pub fn test_engine() -> TestEngine {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let analyzer = Arc::new(ScriptedAnalyzer::new());
    let publisher = Arc::new(MockPublisher::new());
    let history = Arc::new(InMemoryHistoryStore::new());
    let engine = Arc::new(AnalysisEngine::new(
        analyzer.clone(),
        publisher.clone(),
        history.clone(),
    ));
    TestEngine {
        engine,
        analyzer,
        publisher,
        history,
    }
}

pub fn confirmed_result(confidence: u8) -> AnalysisResult {
    AnalysisResult::builder()
        .verdict(Verdict::Confirmed)
        .confidence(confidence)
        .complexity(Complexity::Moderate)
        .reasoning("reproduced against main")
        .build()
}

/// Consume the replay, then the live stream, until a terminal event arrives.
pub async fn next_terminal(
    replay: Vec<JobEvent>,
    rx: &mut broadcast::Receiver<JobEvent>,
) -> JobEvent {
    for event in replay {
        if event.is_terminal() {
            return event;
        }
    }
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for terminal event")
            .expect("event channel closed");
        if event.is_terminal() {
            return event;
        }
    }
}

/// Poll until `check` holds, or fail after five seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

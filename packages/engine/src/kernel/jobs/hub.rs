//! In-process pub/sub hub for job progress events.
//!
//! Per-key broadcast channels used to push [`JobEvent`]s to UI observers.
//! The hub itself has no replay logic; replay-on-attach is handled by
//! [`JobRecordStore::subscribe`](super::JobRecordStore::subscribe), which
//! pairs a snapshot with a receiver under one lock so attaching mid-flight
//! never loses or reorders events.
//!
//! Publishing is synchronous on purpose: the record store publishes while
//! holding its own lock, which is what serializes events per key.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use super::events::JobEvent;
use crate::common::types::JobKey;

const DEFAULT_CAPACITY: usize = 256;

/// Per-key broadcast fan-out.
///
/// Thread-safe. Payloads are [`JobEvent`]s; slow receivers see
/// `RecvError::Lagged` once the channel capacity is exceeded.
pub struct ProgressHub {
    channels: RwLock<HashMap<JobKey, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl ProgressHub {
    /// Create a hub with the default capacity (256 events per key).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Publish an event to its key's channel. No-op if no subscribers.
    pub fn publish(&self, event: JobEvent) {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = channels.get(&event.key()) {
            // Ignore send errors (no active receivers)
            let _ = tx.send(event);
        }
    }

    /// Subscribe to a key. Creates the channel if it doesn't exist.
    pub fn subscribe(&self, key: JobKey) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Remove channels with zero subscribers (housekeeping).
    pub fn cleanup(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn started(number: u64) -> JobEvent {
        JobEvent::Started {
            key: JobKey::issue(number),
            run_id: 1,
        }
    }

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let hub = ProgressHub::new();
        let mut rx = hub.subscribe(JobKey::issue(1));

        hub.publish(started(1));

        match rx.recv().await.unwrap() {
            JobEvent::Started { key, run_id } => {
                assert_eq!(key, JobKey::issue(1));
                assert_eq!(run_id, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = ProgressHub::new();
        // Should not panic or allocate a channel
        hub.publish(started(2));
        assert_eq!(
            hub.channels
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let hub = ProgressHub::new();
        let mut rx_a = hub.subscribe(JobKey::issue(1));
        let mut rx_b = hub.subscribe(JobKey::issue(2));

        hub.publish(started(1));

        assert_eq!(rx_a.recv().await.unwrap().key(), JobKey::issue(1));
        tokio_test::assert_err!(rx_b.try_recv());
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let hub = ProgressHub::new();
        let mut rx1 = hub.subscribe(JobKey::pull_request(5));
        let mut rx2 = hub.subscribe(JobKey::pull_request(5));

        hub.publish(JobEvent::Started {
            key: JobKey::pull_request(5),
            run_id: 7,
        });

        assert_eq!(rx1.recv().await.unwrap().key(), JobKey::pull_request(5));
        assert_eq!(rx2.recv().await.unwrap().key(), JobKey::pull_request(5));
    }

    #[tokio::test]
    async fn cleanup_removes_empty_channels() {
        let hub = ProgressHub::new();
        let rx = hub.subscribe(JobKey::issue(3));

        drop(rx);
        hub.cleanup();

        assert_eq!(
            hub.channels
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            0
        );
    }
}

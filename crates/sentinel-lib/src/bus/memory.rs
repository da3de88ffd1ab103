//! Process-local publish/subscribe bus
//!
//! Each channel name maps to a tokio broadcast channel. Subscribers only see
//! messages published after they subscribed, and publishing to a channel
//! nobody listens on succeeds with zero receivers.

use super::{MessageBus, MessageStream};
use crate::error::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// Default per-channel buffer before slow subscribers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory bus backed by one broadcast channel per channel name
pub struct InMemoryBus {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
    closed: AtomicBool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus whose channels buffer up to `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Close a single channel; current subscribers see end-of-stream
    pub fn close(&self, channel: &str) {
        if self.channels.remove(channel).is_some() {
            debug!(channel = %channel, "Closed bus channel");
        }
    }

    /// Close every channel and reject further use of the bus
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.channels.clear();
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("in-memory bus shut down".to_string()));
        }
        Ok(())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;

        let receiver = self.sender(channel).subscribe();
        let stream = BroadcastStream::new(receiver).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| {
                TransportError::Lagged(skipped)
            })
        });

        Ok(Box::pin(stream))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, TransportError> {
        self.ensure_open()?;

        match self.sender(channel).send(payload) {
            Ok(receivers) => Ok(receivers),
            // No subscribers
            Err(_) => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = InMemoryBus::new();
        let delivered = bus.publish("anomalies", "{}".to_string()).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("response_times").await.unwrap();

        for i in 0..3 {
            let delivered = bus.publish("response_times", format!("msg-{}", i)).await.unwrap();
            assert_eq!(delivered, 1);
        }

        for i in 0..3 {
            let msg = stream.next().await.unwrap().unwrap();
            assert_eq!(msg, format!("msg-{}", i));
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = InMemoryBus::new();
        let mut anomalies = bus.subscribe("anomalies").await.unwrap();

        bus.publish("response_times", "ignored".to_string()).await.unwrap();
        bus.publish("anomalies", "seen".to_string()).await.unwrap();

        assert_eq!(anomalies.next().await.unwrap().unwrap(), "seen");
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_replay() {
        let bus = InMemoryBus::new();
        let _early = bus.subscribe("c").await.unwrap();
        bus.publish("c", "before".to_string()).await.unwrap();

        let mut late = bus.subscribe("c").await.unwrap();
        bus.publish("c", "after".to_string()).await.unwrap();

        assert_eq!(late.next().await.unwrap().unwrap(), "after");
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("c").await.unwrap();
        assert_eq!(bus.subscriber_count("c"), 1);

        bus.publish("c", "last".to_string()).await.unwrap();
        bus.close("c");

        assert_eq!(stream.next().await.unwrap().unwrap(), "last");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_reports_error() {
        let bus = InMemoryBus::with_capacity(2);
        let mut stream = bus.subscribe("c").await.unwrap();

        for i in 0..5 {
            bus.publish("c", i.to_string()).await.unwrap();
        }

        match stream.next().await.unwrap() {
            Err(TransportError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_use() {
        let bus = InMemoryBus::new();
        bus.shutdown();

        assert!(matches!(
            bus.publish("c", "x".to_string()).await,
            Err(TransportError::Closed(_))
        ));
        assert!(bus.subscribe("c").await.is_err());
    }
}

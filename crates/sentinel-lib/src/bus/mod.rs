//! Publish/subscribe transport abstraction
//!
//! The pipeline only depends on the `MessageBus` trait. Two transports are
//! provided:
//! - `InMemoryBus` for process-local channels
//! - `StdioBus` for newline-delimited JSON over stdin/stdout

mod memory;
mod stdio;

pub use memory::{InMemoryBus, DEFAULT_CHANNEL_CAPACITY};
pub use stdio::StdioBus;

use crate::error::TransportError;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Channel carrying raw latency measurements
pub const MEASUREMENTS_CHANNEL: &str = "response_times";

/// Channel carrying enriched anomaly events
pub const ANOMALIES_CHANNEL: &str = "anomalies";

/// Lazy stream of raw payloads from a subscription
///
/// The stream is not restartable: subscribing again yields a new stream that
/// only sees messages published after it was created.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Trait for publish/subscribe transports
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe to a channel
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError>;

    /// Publish a payload, returning the number of subscribers that received it
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, TransportError>;
}

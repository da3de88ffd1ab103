//! Detection pipeline
//!
//! Bridges a `MessageBus` and a single detector: measurements are consumed
//! in arrival order, scored, and republished as anomaly events in the same
//! order.

mod r#loop;

pub use r#loop::{DetectionPipeline, PipelineBuilder};

use crate::bus::{ANOMALIES_CHANNEL, MEASUREMENTS_CHANNEL};
use crate::error::{MalformedMessage, SentinelError};
use crate::models::{AnomalyEvent, Measurement};
use serde::Serialize;

/// Channel routing for a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Channel measurements are consumed from
    pub inbound_channel: String,
    /// Channel anomaly events are published to
    pub outbound_channel: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbound_channel: MEASUREMENTS_CHANNEL.to_string(),
            outbound_channel: ANOMALIES_CHANNEL.to_string(),
        }
    }
}

/// Counters for a single pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Measurements evaluated and published
    pub processed: u64,
    /// Published events flagged as anomalous
    pub anomalies: u64,
    /// Inbound messages skipped as undecodable
    pub malformed: u64,
}

/// Decode a raw inbound payload into a measurement
pub fn decode_measurement(raw: &str) -> Result<Measurement, MalformedMessage> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode an anomaly event into its wire payload
pub fn encode_event(event: &AnomalyEvent) -> Result<String, SentinelError> {
    serde_json::to_string(event).map_err(|e| SentinelError::Encode(e.to_string()))
}

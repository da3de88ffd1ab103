//! Detection loop
//!
//! Consumes measurements from the inbound channel, evaluates them with the
//! pipeline's detector and publishes one anomaly event per measurement.
//! A shutdown signal interrupts the receive; a message that has already
//! been pulled off the stream is always finished first.

use super::{decode_measurement, encode_event, PipelineConfig, PipelineStats};
use crate::bus::{MessageBus, MessageStream};
use crate::detector::AnomalyDetector;
use crate::error::{SentinelError, SentinelResult};
use crate::models::AnomalyEvent;
use crate::observability::SentinelMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Longest slice of a bad payload echoed into logs
const MAX_LOGGED_PAYLOAD: usize = 256;

/// Pipeline driving exactly one detector from a message bus
pub struct DetectionPipeline {
    bus: Arc<dyn MessageBus>,
    config: PipelineConfig,
    metrics: Option<SentinelMetrics>,
    stats: PipelineStats,
}

impl DetectionPipeline {
    /// Create a pipeline with the given bus and channel routing
    pub fn new(bus: Arc<dyn MessageBus>, config: PipelineConfig) -> Self {
        Self {
            bus,
            config,
            metrics: None,
            stats: PipelineStats::default(),
        }
    }

    /// Record throughput and latency in Prometheus
    pub fn with_metrics(mut self, metrics: SentinelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Subscribe to the inbound channel and run until it closes or shutdown fires
    ///
    /// The detector is moved into the run, so no other task can evaluate
    /// values against it concurrently. Dropping the shutdown sender also stops
    /// the loop.
    pub async fn run<D: AnomalyDetector>(
        self,
        detector: D,
        shutdown: broadcast::Receiver<()>,
    ) -> SentinelResult<PipelineStats> {
        let stream = self.bus.subscribe(&self.config.inbound_channel).await?;
        self.run_stream(detector, stream, shutdown).await
    }

    /// Run over an existing subscription
    pub async fn run_stream<D: AnomalyDetector>(
        mut self,
        mut detector: D,
        mut stream: MessageStream,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SentinelResult<PipelineStats> {
        info!(
            detector = detector.name(),
            inbound = %self.config.inbound_channel,
            outbound = %self.config.outbound_channel,
            "Starting detection pipeline"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down detection pipeline");
                    break;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(raw)) => self.handle_message(&mut detector, &raw).await?,
                Some(Err(e)) => {
                    error!(error = %e, "Failed to receive from inbound channel");
                    return Err(e.into());
                }
                None => {
                    info!(
                        channel = %self.config.inbound_channel,
                        "Inbound channel closed, stopping detection pipeline"
                    );
                    break;
                }
            }
        }

        Ok(self.stats)
    }

    /// Score one raw message and publish its event
    ///
    /// Malformed payloads are logged and skipped; only transport and encoding
    /// failures are returned.
    async fn handle_message<D: AnomalyDetector>(
        &mut self,
        detector: &mut D,
        raw: &str,
    ) -> SentinelResult<()> {
        let measurement = match decode_measurement(raw) {
            Ok(measurement) => measurement,
            Err(e) => {
                self.stats.malformed += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.inc_malformed();
                }
                error!(
                    error = %e,
                    payload = %truncate(raw, MAX_LOGGED_PAYLOAD),
                    "Skipping malformed measurement"
                );
                return Ok(());
            }
        };

        let started = Instant::now();
        let is_anomaly = detector.evaluate(measurement.value);
        let elapsed = started.elapsed();

        if is_anomaly {
            warn!(
                response_time = measurement.value,
                timestamp = measurement.timestamp,
                "Anomaly detected"
            );
        } else {
            info!(
                response_time = measurement.value,
                timestamp = measurement.timestamp,
                "Normal value"
            );
        }

        let event = AnomalyEvent::from_measurement(measurement, is_anomaly);
        let payload = encode_event(&event)?;

        let delivered = match self.bus.publish(&self.config.outbound_channel, payload).await {
            Ok(delivered) => delivered,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_publish_errors();
                }
                error!(
                    error = %e,
                    timestamp = measurement.timestamp,
                    "Failed to publish anomaly event"
                );
                return Err(SentinelError::from(e));
            }
        };
        debug!(delivered, timestamp = measurement.timestamp, "Published anomaly event");

        self.stats.processed += 1;
        if is_anomaly {
            self.stats.anomalies += 1;
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_processed();
            if is_anomaly {
                metrics.inc_anomalies();
            }
            metrics.observe_evaluate_latency(elapsed.as_secs_f64());
        }

        Ok(())
    }
}

/// Cut a payload down to at most `max` bytes on a char boundary
fn truncate(raw: &str, max: usize) -> &str {
    if raw.len() <= max {
        return raw;
    }
    let mut end = max;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

/// Builder for creating a detection pipeline
pub struct PipelineBuilder {
    bus: Option<Arc<dyn MessageBus>>,
    config: PipelineConfig,
    metrics: Option<SentinelMetrics>,
}

impl PipelineBuilder {
    /// Create a new builder with default channels
    pub fn new() -> Self {
        Self {
            bus: None,
            config: PipelineConfig::default(),
            metrics: None,
        }
    }

    /// Set the message bus
    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the channel measurements are read from
    pub fn inbound_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.inbound_channel = channel.into();
        self
    }

    /// Set the channel anomaly events are written to
    pub fn outbound_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.outbound_channel = channel.into();
        self
    }

    /// Set the metrics handle
    pub fn metrics(mut self, metrics: SentinelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> SentinelResult<DetectionPipeline> {
        let bus = self
            .bus
            .ok_or_else(|| SentinelError::Setup("message bus is required".to_string()))?;

        if self.config.inbound_channel == self.config.outbound_channel {
            return Err(SentinelError::Setup(format!(
                "inbound and outbound channels must differ, both are '{}'",
                self.config.inbound_channel
            )));
        }

        let mut pipeline = DetectionPipeline::new(bus, self.config);
        pipeline.metrics = self.metrics;
        Ok(pipeline)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

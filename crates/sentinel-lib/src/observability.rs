//! Observability infrastructure for the latency sentinel
//!
//! Provides:
//! - Prometheus metrics (throughput, anomaly counts, malformed input, evaluate latency)
//! - Structured lifecycle logging with tracing

use crate::pipeline::PipelineStats;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, GaugeVec, Histogram,
    IntCounter,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for detector evaluation (in seconds)
const EVALUATE_BUCKETS: &[f64] = &[
    0.000_001, 0.000_005, 0.000_01, 0.000_025, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    measurements_processed: IntCounter,
    anomalies_detected: IntCounter,
    malformed_messages: IntCounter,
    publish_errors: IntCounter,
    measurements_generated: IntCounter,
    evaluate_latency_seconds: Histogram,
    detector_info: GaugeVec,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            measurements_processed: register_int_counter!(
                "sentinel_measurements_processed_total",
                "Measurements evaluated and published as anomaly events"
            )
            .expect("Failed to register measurements_processed"),

            anomalies_detected: register_int_counter!(
                "sentinel_anomalies_detected_total",
                "Measurements flagged as anomalous"
            )
            .expect("Failed to register anomalies_detected"),

            malformed_messages: register_int_counter!(
                "sentinel_malformed_messages_total",
                "Inbound messages skipped because they could not be decoded"
            )
            .expect("Failed to register malformed_messages"),

            publish_errors: register_int_counter!(
                "sentinel_publish_errors_total",
                "Failures publishing anomaly events"
            )
            .expect("Failed to register publish_errors"),

            measurements_generated: register_int_counter!(
                "sentinel_measurements_generated_total",
                "Synthetic measurements published by the generator"
            )
            .expect("Failed to register measurements_generated"),

            evaluate_latency_seconds: register_histogram!(
                "sentinel_evaluate_latency_seconds",
                "Time spent inside a single detector evaluation",
                EVALUATE_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluate_latency_seconds"),

            detector_info: register_gauge_vec!(
                "sentinel_detector_info",
                "The active detector and its parameters",
                &["kind", "params"]
            )
            .expect("Failed to register detector_info"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a metrics handle (registers the global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn inc_processed(&self) {
        self.inner().measurements_processed.inc();
    }

    pub fn inc_anomalies(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_malformed(&self) {
        self.inner().malformed_messages.inc();
    }

    pub fn inc_publish_errors(&self) {
        self.inner().publish_errors.inc();
    }

    pub fn inc_generated(&self) {
        self.inner().measurements_generated.inc();
    }

    pub fn observe_evaluate_latency(&self, duration_secs: f64) {
        self.inner().evaluate_latency_seconds.observe(duration_secs);
    }

    /// Record the active detector, replacing any previous one
    pub fn set_detector(&self, kind: &str, params: &str) {
        self.inner().detector_info.reset();
        self.inner()
            .detector_info
            .with_label_values(&[kind, params])
            .set(1.0);
    }

    pub fn processed_total(&self) -> u64 {
        self.inner().measurements_processed.get()
    }

    pub fn malformed_total(&self) -> u64 {
        self.inner().malformed_messages.get()
    }

    /// Snapshot of the registry the sentinel metrics are registered in
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.inner();
        prometheus::gather()
    }
}

/// Structured logger for sentinel lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log sentinel startup
    pub fn log_startup(&self, version: &str, mode: &str, detector: &str, params: &str) {
        info!(
            event = "sentinel_started",
            instance = %self.instance,
            version = %version,
            mode = %mode,
            detector = %detector,
            params = %params,
            "Latency sentinel started"
        );
    }

    /// Log sentinel shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Latency sentinel shutting down"
        );
    }

    /// Log the outcome of a finished pipeline run
    pub fn log_pipeline_stopped(&self, stats: &PipelineStats) {
        info!(
            event = "pipeline_stopped",
            instance = %self.instance,
            processed = stats.processed,
            anomalies = stats.anomalies,
            malformed = stats.malformed,
            "Detection pipeline stopped"
        );
    }

    /// Log a pipeline run that ended with an error
    pub fn log_pipeline_failed(&self, error: &str) {
        warn!(
            event = "pipeline_failed",
            instance = %self.instance,
            error = %error,
            "Detection pipeline failed"
        );
    }
}

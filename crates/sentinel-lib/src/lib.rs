//! Streaming latency anomaly detection
//!
//! This crate provides the core functionality for:
//! - Online anomaly detectors (windowed z-score, exponential moving average)
//! - The detection pipeline that scores measurements and republishes verdicts
//! - Publish/subscribe transports behind a common bus trait
//! - A synthetic response-time generator
//! - Health checks and observability

pub mod bus;
pub mod detector;
pub mod error;
pub mod generator;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;

pub use detector::{AnomalyDetector, Detector, DetectorConfig};
pub use error::{ConfigError, MalformedMessage, SentinelError, SentinelResult, TransportError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use pipeline::{DetectionPipeline, PipelineBuilder, PipelineConfig, PipelineStats};

//! Sentinel configuration

use anyhow::{Context, Result};
use sentinel_lib::detector::{
    DetectorConfig, DEFAULT_ALPHA, DEFAULT_EMA_THRESHOLD, DEFAULT_SMA_THRESHOLD,
    DEFAULT_WINDOW_SIZE,
};
use sentinel_lib::generator::GeneratorConfig;
use sentinel_lib::{DetectorKind, Environment};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SENTINEL_API_PORT`
const ENV_PREFIX: &str = "SENTINEL";

/// Sentinel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Runtime environment (controls the default log level)
    #[serde(default)]
    pub environment: Environment,

    /// Name reported in structured lifecycle logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Whether to serve the health/metrics API
    #[serde(default = "default_api_enabled")]
    pub api_enabled: bool,

    /// Per-channel buffer of the in-process bus
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Delay between generated samples in milliseconds
    #[serde(default = "default_generator_interval")]
    pub generator_interval_ms: u64,

    /// Seed for reproducible generated streams
    #[serde(default)]
    pub generator_seed: Option<u64>,

    #[serde(default = "default_sma_threshold")]
    pub sma_threshold: f64,

    #[serde(default = "default_sma_window_size")]
    pub sma_window_size: usize,

    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    #[serde(default = "default_ema_threshold")]
    pub ema_threshold: f64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "latency-sentinel".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_api_enabled() -> bool {
    true
}

fn default_bus_capacity() -> usize {
    sentinel_lib::bus::DEFAULT_CHANNEL_CAPACITY
}

fn default_generator_interval() -> u64 {
    100
}

fn default_sma_threshold() -> f64 {
    DEFAULT_SMA_THRESHOLD
}

fn default_sma_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_ema_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_ema_threshold() -> f64 {
    DEFAULT_EMA_THRESHOLD
}

impl SentinelConfig {
    /// Load configuration from an optional file, then the environment
    ///
    /// Environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Detector parameters for the given kind
    pub fn detector_config(&self, kind: DetectorKind) -> DetectorConfig {
        DetectorConfig {
            kind,
            sma_threshold: self.sma_threshold,
            sma_window_size: self.sma_window_size,
            ema_alpha: self.ema_alpha,
            ema_threshold: self.ema_threshold,
        }
    }

    /// Generator settings, with optional command-line overrides
    pub fn generator_config(
        &self,
        limit: Option<u64>,
        interval_ms: Option<u64>,
        seed: Option<u64>,
    ) -> GeneratorConfig {
        GeneratorConfig {
            interval: Duration::from_millis(interval_ms.unwrap_or(self.generator_interval_ms)),
            seed: seed.or(self.generator_seed),
            limit,
            ..GeneratorConfig::default()
        }
    }
}

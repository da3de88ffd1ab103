//! Synthetic response-time source
//!
//! Produces a latency stream that cycles through four load phases with
//! gaussian noise and rare random spikes, and publishes it on the
//! measurements channel.

use crate::bus::{MessageBus, MEASUREMENTS_CHANNEL};
use crate::error::{SentinelError, SentinelResult};
use crate::models::Measurement;
use crate::observability::SentinelMetrics;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Baseline response time in milliseconds
const BASE_RESPONSE_MS: f64 = 200.0;

/// Standard deviation of the baseline noise
const NOISE_STD: f64 = 2.5;

/// Extra latency sustained during the high phase
const HIGH_OFFSET_MS: f64 = 25.0;

/// Per-tick slope of the ramp phases
const RAMP_SLOPE_MS: f64 = 0.25;

/// Probability threshold above which a sample gets a spike
const SPIKE_CUTOFF: f64 = 0.99;

/// Standard deviation of random spikes
const SPIKE_STD: f64 = 10.0;

/// Load phase of the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorPhase {
    Normal,
    RampUp,
    High,
    RampDown,
}

impl GeneratorPhase {
    /// Ticks spent in this phase before moving on
    pub fn duration(&self) -> u64 {
        match self {
            GeneratorPhase::Normal => 200,
            GeneratorPhase::RampUp => 100,
            GeneratorPhase::High => 200,
            GeneratorPhase::RampDown => 100,
        }
    }

    /// The phase that follows this one
    pub fn next(&self) -> Self {
        match self {
            GeneratorPhase::Normal => GeneratorPhase::RampUp,
            GeneratorPhase::RampUp => GeneratorPhase::High,
            GeneratorPhase::High => GeneratorPhase::RampDown,
            GeneratorPhase::RampDown => GeneratorPhase::Normal,
        }
    }
}

/// Configuration for the generator
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Delay between published samples (default: 100ms)
    pub interval: Duration,
    /// RNG seed for reproducible streams
    pub seed: Option<u64>,
    /// Stop after this many samples
    pub limit: Option<u64>,
    /// Channel to publish measurements on
    pub channel: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            seed: None,
            limit: None,
            channel: MEASUREMENTS_CHANNEL.to_string(),
        }
    }
}

/// Phase-based synthetic latency generator
pub struct ResponseTimeGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    timestamp: i64,
    phase: GeneratorPhase,
    phase_counter: u64,
    metrics: Option<SentinelMetrics>,
}

impl ResponseTimeGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng,
            timestamp: 0,
            phase: GeneratorPhase::Normal,
            phase_counter: 0,
            metrics: None,
        }
    }

    /// Count published samples in Prometheus
    pub fn with_metrics(mut self, metrics: SentinelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn phase(&self) -> GeneratorPhase {
        self.phase
    }

    /// Produce the next sample and advance the phase schedule
    pub fn next_measurement(&mut self) -> Measurement {
        let mut response_time = BASE_RESPONSE_MS + self.gauss(NOISE_STD).abs();

        match self.phase {
            GeneratorPhase::Normal => {}
            GeneratorPhase::RampUp => {
                response_time += RAMP_SLOPE_MS * self.phase_counter as f64;
            }
            GeneratorPhase::High => {
                response_time += HIGH_OFFSET_MS + self.gauss(NOISE_STD).abs();
            }
            GeneratorPhase::RampDown => {
                response_time += HIGH_OFFSET_MS - RAMP_SLOPE_MS * self.phase_counter as f64;
            }
        }

        if self.rng.gen::<f64>() > SPIKE_CUTOFF {
            response_time += self.gauss(SPIKE_STD).abs();
        }

        self.timestamp += 1;
        self.phase_counter += 1;
        if self.phase_counter > self.phase.duration() {
            debug!(from = ?self.phase, to = ?self.phase.next(), "Generator phase transition");
            self.phase = self.phase.next();
            self.phase_counter = 0;
        }

        Measurement::new(response_time, self.timestamp)
    }

    /// Publish samples at the configured interval until shutdown or the limit
    ///
    /// Returns the number of samples published.
    pub async fn run(
        mut self,
        bus: Arc<dyn MessageBus>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SentinelResult<u64> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            channel = %self.config.channel,
            "Starting response time generator"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published = 0u64;

        loop {
            if self.config.limit.is_some_and(|limit| published >= limit) {
                info!(published, "Generator reached sample limit");
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(published, "Shutting down response time generator");
                    break;
                }
                _ = ticker.tick() => {
                    let measurement = self.next_measurement();
                    let payload = serde_json::to_string(&measurement)
                        .map_err(|e| SentinelError::Encode(e.to_string()))?;
                    bus.publish(&self.config.channel, payload).await?;

                    published += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_generated();
                    }
                }
            }
        }

        Ok(published)
    }

    fn gauss(&mut self, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * std_dev
    }
}

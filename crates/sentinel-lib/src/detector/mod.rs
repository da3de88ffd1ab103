//! Online anomaly detectors for scalar streams
//!
//! This module provides:
//! - The `AnomalyDetector` trait (one value in, one verdict out)
//! - Windowed z-score detection over a fixed-size ring buffer
//! - Exponential moving average detection with online variance
//! - `DetectorConfig` for validated construction from configuration

mod ema;
mod window;
mod windowed;

pub use ema::{EmaDetector, DEFAULT_ALPHA, DEFAULT_EMA_THRESHOLD};
pub use window::RingBuffer;
pub use windowed::{WindowedZScoreDetector, DEFAULT_SMA_THRESHOLD, DEFAULT_WINDOW_SIZE};

use crate::error::ConfigError;
use crate::models::DetectorKind;
use serde::{Deserialize, Serialize};

/// A stateful detector that judges one value at a time
///
/// `evaluate` takes `&mut self`: a detector has exactly one caller at a time
/// and its state evolves with every value it sees.
pub trait AnomalyDetector: Send {
    /// Update internal state with `value` and return true if it is anomalous
    fn evaluate(&mut self, value: f64) -> bool;

    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str {
        "detector"
    }
}

/// The detector variants supported by the pipeline
#[derive(Debug, Clone)]
pub enum Detector {
    Windowed(WindowedZScoreDetector),
    Ema(EmaDetector),
}

impl Detector {
    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Windowed(_) => DetectorKind::Sma,
            Detector::Ema(_) => DetectorKind::Ema,
        }
    }
}

impl AnomalyDetector for Detector {
    fn evaluate(&mut self, value: f64) -> bool {
        match self {
            Detector::Windowed(d) => d.evaluate(value),
            Detector::Ema(d) => d.evaluate(value),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Detector::Windowed(d) => d.name(),
            Detector::Ema(d) => d.name(),
        }
    }
}

impl From<WindowedZScoreDetector> for Detector {
    fn from(detector: WindowedZScoreDetector) -> Self {
        Detector::Windowed(detector)
    }
}

impl From<EmaDetector> for Detector {
    fn from(detector: EmaDetector) -> Self {
        Detector::Ema(detector)
    }
}

/// Detector selection and per-variant parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub kind: DetectorKind,
    /// Z-score threshold for the windowed detector
    #[serde(default = "default_sma_threshold")]
    pub sma_threshold: f64,
    /// Window length for the windowed detector
    #[serde(default = "default_window_size")]
    pub sma_window_size: usize,
    /// Smoothing factor for the EMA detector
    #[serde(default = "default_alpha")]
    pub ema_alpha: f64,
    /// Band width (in standard deviations) for the EMA detector
    #[serde(default = "default_ema_threshold")]
    pub ema_threshold: f64,
}

fn default_sma_threshold() -> f64 {
    DEFAULT_SMA_THRESHOLD
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_ema_threshold() -> f64 {
    DEFAULT_EMA_THRESHOLD
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            sma_threshold: DEFAULT_SMA_THRESHOLD,
            sma_window_size: DEFAULT_WINDOW_SIZE,
            ema_alpha: DEFAULT_ALPHA,
            ema_threshold: DEFAULT_EMA_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    /// Use the given detector kind with the current parameters
    pub fn with_kind(mut self, kind: DetectorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Validate the parameters of the selected kind and build a fresh detector
    pub fn build(&self) -> Result<Detector, ConfigError> {
        match self.kind {
            DetectorKind::Sma => {
                WindowedZScoreDetector::new(self.sma_threshold, self.sma_window_size)
                    .map(Detector::from)
            }
            DetectorKind::Ema => {
                EmaDetector::new(self.ema_alpha, self.ema_threshold).map(Detector::from)
            }
        }
    }

    /// Human-readable parameter summary for the selected kind
    pub fn describe(&self) -> String {
        match self.kind {
            DetectorKind::Sma => format!(
                "threshold={},window_size={}",
                self.sma_threshold, self.sma_window_size
            ),
            DetectorKind::Ema => {
                format!("alpha={},threshold={}", self.ema_alpha, self.ema_threshold)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_is_windowed() {
        let detector = DetectorConfig::default().build().unwrap();
        assert_eq!(detector.kind(), DetectorKind::Sma);
        assert_eq!(detector.name(), "sma");
    }

    #[test]
    fn test_build_ema() {
        let detector = DetectorConfig::default()
            .with_kind(DetectorKind::Ema)
            .build()
            .unwrap();

        match detector {
            Detector::Ema(ema) => {
                assert_eq!(ema.alpha(), DEFAULT_ALPHA);
                assert_eq!(ema.threshold(), DEFAULT_EMA_THRESHOLD);
            }
            other => panic!("expected EMA detector, got {:?}", other),
        }
    }

    #[test]
    fn test_build_validates_only_selected_kind() {
        let config = DetectorConfig {
            ema_alpha: 4.0,
            ..DetectorConfig::default()
        };

        // The SMA parameters are fine, so the SMA build succeeds
        assert!(config.build().is_ok());
        assert_eq!(
            config.with_kind(DetectorKind::Ema).build().unwrap_err(),
            ConfigError::InvalidAlpha(4.0)
        );
    }

    #[test]
    fn test_enum_delegates_evaluate() {
        let mut direct = EmaDetector::new(0.5, 2.0).unwrap();
        let mut wrapped = Detector::from(EmaDetector::new(0.5, 2.0).unwrap());

        for v in [10.0, 11.0, 30.0, 9.0, 10.0] {
            assert_eq!(direct.evaluate(v), wrapped.evaluate(v));
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: DetectorConfig = serde_json::from_str(r#"{"kind": "ema"}"#).unwrap();
        assert_eq!(config.kind, DetectorKind::Ema);
        assert_eq!(config.sma_window_size, 25);
        assert_eq!(config.describe(), "alpha=0.08,threshold=2.2");
    }

    #[test]
    fn test_trait_object_usage() {
        let mut detectors: Vec<Box<dyn AnomalyDetector>> = vec![
            Box::new(WindowedZScoreDetector::default()),
            Box::new(EmaDetector::default()),
        ];

        for detector in detectors.iter_mut() {
            assert!(!detector.evaluate(200.0));
        }
    }
}

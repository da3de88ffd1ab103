//! Windowed z-score detection
//!
//! Scores each value against the population mean and standard deviation of
//! the last `window_size` observations. The value being scored is pushed
//! into the window first, so it is part of its own baseline.

use super::window::RingBuffer;
use super::AnomalyDetector;
use crate::error::ConfigError;

/// Default z-score threshold
pub const DEFAULT_SMA_THRESHOLD: f64 = 2.0;

/// Default number of samples in the window
pub const DEFAULT_WINDOW_SIZE: usize = 25;

/// Detects outliers by z-score over a sliding window
#[derive(Debug, Clone)]
pub struct WindowedZScoreDetector {
    threshold: f64,
    window_size: usize,
    window: RingBuffer,
}

impl WindowedZScoreDetector {
    /// Create a detector, validating threshold and window size
    pub fn new(threshold: f64, window_size: usize) -> Result<Self, ConfigError> {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if window_size == 0 {
            return Err(ConfigError::InvalidWindowSize(window_size));
        }

        Ok(Self {
            threshold,
            window_size,
            window: RingBuffer::new(window_size),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of samples currently held in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Whether enough history has been seen to start scoring
    pub fn is_warmed_up(&self) -> bool {
        self.window.is_full()
    }

    /// Z-score of `value` against the current window contents
    ///
    /// A zero standard deviation is replaced by 1, so a constant window
    /// scores the raw distance from the mean.
    fn z_score(&self, value: f64) -> Option<f64> {
        let (mean, std) = self.window.mean_and_std()?;
        let denominator = if std > 0.0 { std } else { 1.0 };
        Some((value - mean) / denominator)
    }
}

impl Default for WindowedZScoreDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SMA_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            window: RingBuffer::new(DEFAULT_WINDOW_SIZE),
        }
    }
}

impl AnomalyDetector for WindowedZScoreDetector {
    fn evaluate(&mut self, value: f64) -> bool {
        self.window.push(value);

        if !self.is_warmed_up() {
            return false;
        }

        match self.z_score(value) {
            Some(z) => z.abs() > self.threshold,
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "sma"
    }
}

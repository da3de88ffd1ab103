//! Exponential moving average detection
//!
//! Tracks an exponentially weighted mean and variance and flags values that
//! fall outside `ema ± threshold * std`.

use super::AnomalyDetector;
use crate::error::ConfigError;

/// Default smoothing factor
pub const DEFAULT_ALPHA: f64 = 0.08;

/// Default band width in standard deviations
pub const DEFAULT_EMA_THRESHOLD: f64 = 2.2;

/// Detects outliers against an exponentially weighted band
///
/// Inputs are expected to be latencies, far below `f64::MAX.sqrt()`. A value
/// whose squared deviation overflows leaves the variance infinite, after
/// which the band covers everything and no later value is flagged.
#[derive(Debug, Clone)]
pub struct EmaDetector {
    alpha: f64,
    threshold: f64,
    /// `None` until the first value has been observed
    ema: Option<f64>,
    variance: f64,
}

impl EmaDetector {
    /// Create a detector, validating alpha and threshold
    pub fn new(alpha: f64, threshold: f64) -> Result<Self, ConfigError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        Ok(Self {
            alpha,
            threshold,
            ema: None,
            variance: 0.0,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Current moving average, `None` before the first value
    pub fn ema(&self) -> Option<f64> {
        self.ema
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}

impl Default for EmaDetector {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            threshold: DEFAULT_EMA_THRESHOLD,
            ema: None,
            variance: 0.0,
        }
    }
}

impl AnomalyDetector for EmaDetector {
    fn evaluate(&mut self, value: f64) -> bool {
        let previous = match self.ema {
            Some(ema) => ema,
            None => {
                self.ema = Some(value);
                self.variance = 0.0;
                return false;
            }
        };

        // The mean moves first; the variance deviation is taken against the
        // updated mean. Reordering these changes the filter response.
        let ema = self.alpha * value + (1.0 - self.alpha) * previous;
        let variance = (1.0 - self.alpha) * (self.variance + self.alpha * (value - ema).powi(2));
        let band = variance.sqrt() * self.threshold;

        self.ema = Some(ema);
        self.variance = variance;

        value > ema + band || value < ema - band
    }

    fn name(&self) -> &'static str {
        "ema"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let detector = EmaDetector::default();
        assert_eq!(detector.alpha(), 0.08);
        assert_eq!(detector.threshold(), 2.2);
        assert_eq!(detector.ema(), None);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_eq!(EmaDetector::new(0.0, 2.0).unwrap_err(), ConfigError::InvalidAlpha(0.0));
        assert_eq!(EmaDetector::new(1.0, 2.0).unwrap_err(), ConfigError::InvalidAlpha(1.0));
        assert!(EmaDetector::new(f64::NAN, 2.0).is_err());
        assert_eq!(
            EmaDetector::new(0.5, -2.0).unwrap_err(),
            ConfigError::InvalidThreshold(-2.0)
        );
        assert!(EmaDetector::new(0.5, f64::INFINITY).is_err());
    }

    #[test]
    fn test_first_value_initializes_state() {
        let mut detector = EmaDetector::default();

        assert!(!detector.evaluate(1_000_000.0));
        assert_eq!(detector.ema(), Some(1_000_000.0));
        assert_eq!(detector.variance(), 0.0);
    }

    #[test]
    fn test_constant_input_is_normal() {
        let mut detector = EmaDetector::new(0.5, 2.0).unwrap();

        assert!(!detector.evaluate(10.0));
        assert!(!detector.evaluate(10.0));
        assert_eq!(detector.ema(), Some(10.0));
        assert_eq!(detector.variance(), 0.0);
    }

    #[test]
    fn test_variance_uses_updated_mean() {
        let mut detector = EmaDetector::new(0.5, 2.0).unwrap();
        detector.evaluate(10.0);
        detector.evaluate(20.0);

        // ema = 15; variance = 0.5 * (0 + 0.5 * (20 - 15)^2) = 6.25.
        // Using the previous mean would give 0.5 * 0.5 * 100 = 25.
        assert_eq!(detector.ema(), Some(15.0));
        assert_eq!(detector.variance(), 6.25);
    }

    #[test]
    fn test_band_boundary_is_exclusive() {
        let mut detector = EmaDetector::new(0.5, 2.0).unwrap();
        detector.evaluate(10.0);

        // ema = 11, variance = 0.25, std = 0.5 -> upper band is exactly 12
        assert!(!detector.evaluate(12.0));
        assert_eq!(detector.ema(), Some(11.0));
        assert_eq!(detector.variance(), 0.25);
    }

    #[test]
    fn test_detects_jump_with_defaults() {
        let mut detector = EmaDetector::default();
        for _ in 0..50 {
            assert!(!detector.evaluate(200.0));
        }

        assert!(detector.evaluate(300.0));
        assert!(detector.evaluate(100.0));
    }

    #[test]
    fn test_state_committed_on_anomaly() {
        let mut detector = EmaDetector::new(0.5, 1.5).unwrap();
        detector.evaluate(10.0);
        detector.evaluate(10.0);

        // ema = 30, variance = 0.5 * 0.5 * 20^2 = 100, band = 15
        assert!(detector.evaluate(50.0));
        assert_eq!(detector.ema(), Some(30.0));
        assert_eq!(detector.variance(), 100.0);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let inputs: Vec<f64> = (0..500)
            .map(|i| 200.0 + ((i * 37) % 23) as f64 + if i % 97 == 0 { 80.0 } else { 0.0 })
            .collect();

        let mut a = EmaDetector::default();
        let mut b = EmaDetector::default();

        let va: Vec<bool> = inputs.iter().map(|&v| a.evaluate(v)).collect();
        let vb: Vec<bool> = inputs.iter().map(|&v| b.evaluate(v)).collect();

        assert_eq!(va, vb);
        assert!(va.iter().any(|&flag| flag));
        assert_eq!(a.variance(), b.variance());
    }

    #[test]
    fn test_overflowing_input_saturates_band() {
        let mut detector = EmaDetector::default();
        detector.evaluate(200.0);
        detector.evaluate(200.0);

        assert!(!detector.evaluate(1e308));
        assert!(detector.variance().is_infinite());
        assert!(detector.ema().unwrap().is_finite());
        assert!(!detector.evaluate(1e6));
    }

    #[test]
    fn test_variance_never_negative() {
        let mut detector = EmaDetector::new(0.3, 2.0).unwrap();
        for i in 0..1000 {
            let value = ((i as f64) * 0.731).sin() * 50.0 + 100.0;
            detector.evaluate(value);
            assert!(detector.variance() >= 0.0);
        }
    }
}

//! Core data models for the latency sentinel

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single latency sample read from the measurements channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Observed response time in milliseconds
    #[serde(rename = "response_time")]
    pub value: f64,
    /// Monotonic sample timestamp assigned by the source
    pub timestamp: i64,
}

impl Measurement {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// A measurement enriched with the detector verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    #[serde(rename = "response_time")]
    pub value: f64,
    pub timestamp: i64,
    #[serde(rename = "anomaly")]
    pub is_anomaly: bool,
}

impl AnomalyEvent {
    /// Pair a measurement with the verdict produced for it
    pub fn from_measurement(measurement: Measurement, is_anomaly: bool) -> Self {
        Self {
            value: measurement.value,
            timestamp: measurement.timestamp,
            is_anomaly,
        }
    }
}

/// Detector algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Windowed z-score over a simple moving average
    #[default]
    Sma,
    /// Exponential moving average with online variance
    Ema,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Sma => "sma",
            DetectorKind::Ema => "ema",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sma" => Ok(DetectorKind::Sma),
            "ema" => Ok(DetectorKind::Ema),
            other => Err(format!("unknown detector type '{}', expected sma or ema", other)),
        }
    }
}

/// Runtime environment, controls default verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Default tracing filter directive for this environment
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Production => "info",
            Environment::Development | Environment::Testing => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_wire_format() {
        let m: Measurement =
            serde_json::from_str(r#"{"response_time": 201.5, "timestamp": 7}"#).unwrap();
        assert_eq!(m, Measurement::new(201.5, 7));
    }

    #[test]
    fn test_measurement_accepts_integer_value_and_extra_fields() {
        let m: Measurement =
            serde_json::from_str(r#"{"timestamp": 3, "response_time": 200, "host": "a"}"#)
                .unwrap();
        assert_eq!(m.value, 200.0);
        assert_eq!(m.timestamp, 3);
    }

    #[test]
    fn test_anomaly_event_wire_format() {
        let event = AnomalyEvent::from_measurement(Measurement::new(250.0, 42), true);
        let json: serde_json::Value = serde_json::to_value(event).unwrap();

        assert_eq!(json["response_time"], 250.0);
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["anomaly"], true);
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_detector_kind_parsing() {
        assert_eq!("sma".parse::<DetectorKind>().unwrap(), DetectorKind::Sma);
        assert_eq!("EMA".parse::<DetectorKind>().unwrap(), DetectorKind::Ema);
        assert!("median".parse::<DetectorKind>().is_err());
        assert_eq!(DetectorKind::default(), DetectorKind::Sma);
    }

    #[test]
    fn test_environment_log_level() {
        assert_eq!(Environment::Production.default_log_level(), "info");
        assert_eq!(Environment::Development.default_log_level(), "debug");
        let env: Environment = serde_json::from_str(r#""testing""#).unwrap();
        assert_eq!(env, Environment::Testing);
    }
}

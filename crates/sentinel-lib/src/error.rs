//! Error types for detector construction, message decoding and transport

use thiserror::Error;

/// Invalid detector parameters, fatal at startup
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("window_size must be greater than zero, got {0}")]
    InvalidWindowSize(usize),

    #[error("alpha must lie strictly between 0 and 1, got {0}")]
    InvalidAlpha(f64),
}

/// Inbound payload that could not be decoded into a measurement
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid field value: {0}")]
    InvalidField(String),
}

impl From<serde_json::Error> for MalformedMessage {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let message = e.to_string();
        match e.classify() {
            Category::Data if message.starts_with("missing field") => {
                MalformedMessage::MissingField(message)
            }
            Category::Data => MalformedMessage::InvalidField(message),
            Category::Io | Category::Syntax | Category::Eof => {
                MalformedMessage::InvalidJson(message)
            }
        }
    }
}

/// Failures of the underlying publish/subscribe transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("channel closed: {0}")]
    Closed(String),

    #[error("subscriber lagged behind, {0} messages skipped")]
    Lagged(u64),

    #[error("publish to '{channel}' failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error surfaced by the detection pipeline
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("pipeline setup error: {0}")]
    Setup(String),
}

/// Convenience alias for pipeline results
pub type SentinelResult<T> = Result<T, SentinelError>;

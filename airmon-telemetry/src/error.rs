//! Error types for the telemetry core.

use thiserror::Error;

/// Result type alias using [`TelemetryError`].
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while talking to the broker or the HTTP receiver.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No broker session is established.
    #[error("MQTT link is not connected")]
    NotConnected,

    /// The broker link could not be set up.
    #[error("MQTT connection error: {0}")]
    Connect(String),

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A serialized document exceeds the payload budget.
    #[error("Payload for {topic} is {size} bytes, exceeds budget of {budget} bytes")]
    PayloadTooLarge {
        topic: String,
        size: usize,
        budget: usize,
    },

    /// Secondary HTTP delivery error.
    #[error("HTTP delivery error: {0}")]
    Http(String),
}

impl TelemetryError {
    /// Create a publish error for a topic.
    pub fn publish(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.into(),
        }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<airmon_common::Error> for TelemetryError {
    fn from(err: airmon_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

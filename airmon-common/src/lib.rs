//! airmon Common Library
//!
//! This crate provides shared types and utilities for the airmon air quality monitor:
//!
//! - [`reading`] - Sensor snapshot and derived metric data model
//! - [`metrics`] - AQI, dew point and comfort index calculators
//! - [`topics`] - MQTT topic and identifier builders
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod reading;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{
    AirmonConfig, DeviceConfig, HttpConfig, LogFormat, LoggingConfig, MqttConfig, SensorConfig,
    TimingConfig, load_config, parse_config,
};
pub use error::{Error, Result};
pub use reading::{DerivedMetrics, Reading, SensorSnapshot};
pub use topics::TopicBuilder;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}

//! Sensor acquisition errors.

use thiserror::Error;

/// Errors raised while reading the monitor's sensors.
#[derive(Error, Debug)]
pub enum SensorError {
    /// The serial port could not be opened.
    #[error("Serial port error: {0}")]
    Serial(String),

    /// A PM1006 frame failed validation.
    #[error("Invalid PM1006 frame: {0}")]
    Frame(String),

    /// A sysfs attribute could not be read or parsed.
    #[error("Failed to read {path}: {message}")]
    Attribute { path: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SensorError {
    /// Create an attribute error.
    pub fn attribute(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Attribute {
            path: path.into(),
            message: msg.into(),
        }
    }
}

impl From<tokio_serial::Error> for SensorError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::Serial(err.to_string())
    }
}

//! Temperature, humidity and pressure from a Linux IIO device (e.g. BME280).

use std::path::{Path, PathBuf};

use crate::error::SensorError;

const TEMPERATURE: &str = "in_temp_input";
const HUMIDITY: &str = "in_humidityrelative_input";
const PRESSURE: &str = "in_pressure_input";

/// One environment reading in display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentSample {
    /// °C
    pub temperature: f32,
    /// %
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
}

/// Reads processed values from an IIO sysfs device directory.
#[derive(Debug, Clone)]
pub struct IioEnvironment {
    device: PathBuf,
}

impl IioEnvironment {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Read all three channels.
    ///
    /// IIO reports milli-degrees Celsius, milli-percent and kilopascal.
    pub async fn read(&self) -> Result<EnvironmentSample, SensorError> {
        let temperature = self.attribute(TEMPERATURE).await? / 1000.0;
        let humidity = self.attribute(HUMIDITY).await? / 1000.0;
        let pressure = self.attribute(PRESSURE).await? * 10.0;

        Ok(EnvironmentSample {
            temperature: temperature as f32,
            humidity: humidity as f32,
            pressure: pressure as f32,
        })
    }

    async fn attribute(&self, name: &str) -> Result<f64, SensorError> {
        let path = self.device.join(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::attribute(path.display().to_string(), e.to_string()))?;

        parse_attribute(&text)
            .ok_or_else(|| SensorError::attribute(path.display().to_string(), "not a number"))
    }
}

fn parse_attribute(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

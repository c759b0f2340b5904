//! Sensor snapshot collection.

use tokio::sync::watch;
use tokio::time::Instant;

use airmon_common::{SensorConfig, SensorSnapshot};
use airmon_telemetry::SnapshotSource;

use crate::environment::{EnvironmentSample, IioEnvironment};
use crate::error::SensorError;
use crate::pm1006;

/// Calibration applied to raw sensor values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    /// Added to the temperature in °C.
    pub temp_offset: f32,
    /// Added to the PM2.5 concentration in µg/m³.
    pub pm25_offset: f32,
}

impl From<&SensorConfig> for Calibration {
    fn from(config: &SensorConfig) -> Self {
        Self {
            temp_offset: config.temp_offset,
            pm25_offset: config.pm25_calibration,
        }
    }
}

/// Combine raw readings into a snapshot.
///
/// The calibrated PM2.5 value is rounded and clamped to the `u16` range.
pub fn assemble(
    pm25_raw: u16,
    environment: EnvironmentSample,
    calibration: Calibration,
    uptime: u32,
) -> SensorSnapshot {
    let pm25 = (f32::from(pm25_raw) + calibration.pm25_offset)
        .round()
        .clamp(0.0, f32::from(u16::MAX)) as u16;

    SensorSnapshot {
        pm25,
        temperature: environment.temperature + calibration.temp_offset,
        humidity: environment.humidity,
        pressure: environment.pressure,
        uptime,
    }
}

/// Collects snapshots from the PM1006 and the IIO environment sensor.
pub struct SensorCollector {
    pm25: watch::Receiver<Option<u16>>,
    environment: IioEnvironment,
    calibration: Calibration,
    started: Instant,
}

impl SensorCollector {
    /// Create a collector over an already running PM2.5 feed.
    pub fn new(
        pm25: watch::Receiver<Option<u16>>,
        environment: IioEnvironment,
        calibration: Calibration,
    ) -> Self {
        Self {
            pm25,
            environment,
            calibration,
            started: Instant::now(),
        }
    }

    /// Open the serial port and the IIO device named in the configuration.
    pub fn open(config: &SensorConfig) -> Result<Self, SensorError> {
        let pm25 = pm1006::spawn_reader(&config.serial_port, config.baud_rate)?;
        let environment = IioEnvironment::new(&config.iio_device);

        tracing::info!(
            serial_port = %config.serial_port,
            iio_device = %config.iio_device,
            "Sensors configured"
        );

        Ok(Self::new(pm25, environment, Calibration::from(config)))
    }

    fn uptime(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

impl SnapshotSource for SensorCollector {
    /// A failed environment read skips the sample. Until the PM1006 delivers
    /// its first valid frame, PM2.5 reads as zero.
    async fn sample(&mut self) -> Option<SensorSnapshot> {
        let environment = match self.environment.read().await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "Environment sensor read failed");
                return None;
            }
        };

        let pm25 = (*self.pm25.borrow()).unwrap_or_else(|| {
            tracing::debug!("No PM1006 frame received yet");
            0
        });

        Some(assemble(pm25, environment, self.calibration, self.uptime()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ENVIRONMENT: EnvironmentSample = EnvironmentSample {
        temperature: 23.0,
        humidity: 40.0,
        pressure: 1000.0,
    };

    #[test]
    fn test_assemble_applies_calibration() {
        let calibration = Calibration {
            temp_offset: -1.5,
            pm25_offset: 2.4,
        };

        let snapshot = assemble(10, ENVIRONMENT, calibration, 42);

        assert_eq!(snapshot.pm25, 12);
        assert_eq!(snapshot.temperature, 21.5);
        assert_eq!(snapshot.humidity, 40.0);
        assert_eq!(snapshot.pressure, 1000.0);
        assert_eq!(snapshot.uptime, 42);
    }

    #[test]
    fn test_assemble_clamps_pm25() {
        let negative = Calibration {
            pm25_offset: -50.0,
            ..Calibration::default()
        };
        assert_eq!(assemble(10, ENVIRONMENT, negative, 0).pm25, 0);

        let overflow = Calibration {
            pm25_offset: 100.0,
            ..Calibration::default()
        };
        assert_eq!(assemble(u16::MAX, ENVIRONMENT, overflow, 0).pm25, u16::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_skipped_without_environment() {
        let (_tx, rx) = watch::channel(Some(12));
        let mut collector = SensorCollector::new(
            rx,
            IioEnvironment::new("/nonexistent/iio:device0"),
            Calibration::default(),
        );

        assert!(collector.sample().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_tracks_elapsed_time() {
        let (_tx, rx) = watch::channel(None);
        let collector = SensorCollector::new(
            rx,
            IioEnvironment::new("/nonexistent/iio:device0"),
            Calibration::default(),
        );

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(collector.uptime(), 90);
    }
}

use serde::{Deserialize, Serialize};

use crate::metrics;

/// One raw sample from the monitor's sensors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// PM2.5 concentration in µg/m³.
    pub pm25: u16,

    /// Temperature in °C.
    pub temperature: f32,

    /// Relative humidity in %.
    pub humidity: f32,

    /// Barometric pressure in hPa.
    pub pressure: f32,

    /// Process uptime in seconds.
    pub uptime: u32,
}

/// Values computed from a [`SensorSnapshot`] before publication.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// US EPA air quality index for PM2.5.
    pub aqi: u16,

    /// AQI category, 1 (good) to 5 (very unhealthy or worse).
    pub aqi_category: u8,

    /// Dew point in °C.
    pub dew_point: f32,

    /// Comfort score, 0 to 100 (higher is better).
    pub comfort_index: f32,
}

impl DerivedMetrics {
    /// Compute all derived metrics for a snapshot.
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        let aqi = metrics::pm25_aqi(snapshot.pm25);
        Self {
            aqi,
            aqi_category: metrics::aqi_category(aqi),
            dew_point: metrics::dew_point(snapshot.temperature, snapshot.humidity),
            comfort_index: metrics::comfort_index(snapshot.temperature, snapshot.humidity),
        }
    }
}

/// A snapshot together with its derived metrics, the unit handed to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub snapshot: SensorSnapshot,
    pub metrics: DerivedMetrics,
}

impl Reading {
    /// Pair a snapshot with already computed metrics.
    pub fn new(snapshot: SensorSnapshot, metrics: DerivedMetrics) -> Self {
        Self { snapshot, metrics }
    }

    /// Build a reading, computing the derived metrics from the snapshot.
    pub fn from_snapshot(snapshot: SensorSnapshot) -> Self {
        Self {
            metrics: DerivedMetrics::from_snapshot(&snapshot),
            snapshot,
        }
    }
}

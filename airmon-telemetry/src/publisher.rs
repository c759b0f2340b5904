//! Publication of sensor readings.
//!
//! Every reading is published twice: a flat native document on
//! `tele/<base>/state` and a Tasmota-compatible document on
//! `tele/<base>/SENSOR`. While the link is down the latest reading waits in a
//! single-slot buffer and is flushed when the next epoch starts.

use serde::Serialize;

use airmon_common::Reading;

use crate::error::{Result, TelemetryError};
use crate::identity::DeviceIdentity;
use crate::link::{BrokerLink, Qos};
use crate::status::Availability;

/// Single-slot buffer holding the latest reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingSnapshot {
    /// Latest reading handed to the engine, sent or not.
    pub data: Option<Reading>,
    /// `data` has not been published because the link was down.
    pub pending: bool,
    /// A native document has been published at least once in this process.
    pub ever_sent: bool,
}

/// Native state document, one key per discovery channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDocument {
    pub pm25: u16,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub aqi: u16,
    pub aqi_category: u8,
    pub dew_point: f64,
    pub comfort_index: f64,
    pub uptime: u32,
}

impl From<&Reading> for StateDocument {
    fn from(reading: &Reading) -> Self {
        let snapshot = &reading.snapshot;
        let metrics = &reading.metrics;
        Self {
            pm25: snapshot.pm25,
            temperature: round_to(snapshot.temperature, 1),
            humidity: round_to(snapshot.humidity, 1),
            pressure: round_to(snapshot.pressure, 2),
            aqi: metrics.aqi,
            aqi_category: metrics.aqi_category,
            dew_point: round_to(metrics.dew_point, 1),
            comfort_index: round_to(metrics.comfort_index, 1),
            uptime: snapshot.uptime,
        }
    }
}

/// Tasmota-style document for consumers of the legacy topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDocument {
    /// Uptime in seconds, as a string.
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "BME280")]
    pub environment: EnvironmentSection,
    #[serde(rename = "PM2.5")]
    pub particulate: ParticulateSection,
    #[serde(rename = "AQI")]
    pub aqi: u16,
    #[serde(rename = "AQICategory")]
    pub aqi_category: u8,
    #[serde(rename = "DewPoint")]
    pub dew_point: f64,
    #[serde(rename = "ComfortIndex")]
    pub comfort_index: f64,
    #[serde(rename = "Uptime")]
    pub uptime: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentSection {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticulateSection {
    #[serde(rename = "PM2.5")]
    pub pm25: u16,
}

impl From<&Reading> for SensorDocument {
    fn from(reading: &Reading) -> Self {
        let snapshot = &reading.snapshot;
        let metrics = &reading.metrics;
        Self {
            time: snapshot.uptime.to_string(),
            environment: EnvironmentSection {
                temperature: round_to(snapshot.temperature, 1),
                humidity: round_to(snapshot.humidity, 1),
                pressure: round_to(snapshot.pressure, 2),
            },
            particulate: ParticulateSection { pm25: snapshot.pm25 },
            aqi: metrics.aqi,
            aqi_category: metrics.aqi_category,
            dew_point: round_to(metrics.dew_point, 1),
            comfort_index: round_to(metrics.comfort_index, 1),
            uptime: snapshot.uptime,
        }
    }
}

/// Round to a fixed number of decimals for display.
fn round_to(value: f32, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (f64::from(value) * factor).round() / factor
}

/// Serialize a document, enforcing the payload budget.
pub fn encode_document<T: Serialize>(topic: &str, document: &T, budget: usize) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(document)?;
    if payload.len() > budget {
        return Err(TelemetryError::PayloadTooLarge {
            topic: topic.to_string(),
            size: payload.len(),
            budget,
        });
    }
    Ok(payload)
}

/// What happened to a reading handed to [`PublicationEngine::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The link was down; the reading waits in the buffer.
    Buffered,
    /// Publication was attempted on the live link.
    Sent(PublishStats),
}

/// Turns readings into published documents.
#[derive(Debug, Clone)]
pub struct PublicationEngine {
    pending: PendingSnapshot,
    payload_budget: usize,
}

impl PublicationEngine {
    pub fn new(payload_budget: usize) -> Self {
        Self {
            pending: PendingSnapshot::default(),
            payload_budget,
        }
    }

    pub fn pending(&self) -> &PendingSnapshot {
        &self.pending
    }

    /// Store a reading and publish it if the session is live.
    ///
    /// `identity` is `None` until the first connection attempt resolved it,
    /// which can only happen while disconnected.
    pub async fn publish<L: BrokerLink>(
        &mut self,
        link: &mut L,
        identity: Option<&DeviceIdentity>,
        connected: bool,
        reading: Reading,
    ) -> PublishOutcome {
        self.pending.data = Some(reading);

        let identity = match identity {
            Some(identity) if connected => identity,
            _ => {
                self.pending.pending = true;
                tracing::debug!("MQTT not connected, reading buffered");
                return PublishOutcome::Buffered;
            }
        };

        self.pending.pending = false;
        PublishOutcome::Sent(self.send(link, identity, &reading).await)
    }

    /// Republish the buffered reading, if any, at the start of an epoch.
    pub async fn flush<L: BrokerLink>(
        &mut self,
        link: &mut L,
        identity: &DeviceIdentity,
    ) -> Option<PublishStats> {
        if !self.pending.pending {
            return None;
        }
        let reading = self.pending.data?;

        self.pending.pending = false;
        tracing::info!("Publishing buffered reading");
        Some(self.send(link, identity, &reading).await)
    }

    async fn send<L: BrokerLink>(
        &mut self,
        link: &mut L,
        identity: &DeviceIdentity,
        reading: &Reading,
    ) -> PublishStats {
        let mut stats = PublishStats::default();

        let state = match encode_document(
            &identity.state_topic,
            &StateDocument::from(reading),
            self.payload_budget,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                // The legacy document carries the same values; skip it too.
                stats.failed += 1;
                tracing::error!(error = %e, "Dropping reading");
                return stats;
            }
        };

        let retain = !self.pending.ever_sent;
        match link
            .publish(&identity.state_topic, &state, Qos::AtMostOnce, retain)
            .await
        {
            Ok(()) => {
                stats.success += 1;
                self.pending.ever_sent = true;
                tracing::debug!(topic = %identity.state_topic, retain, "Published state");

                if let Err(e) = Availability::Online.publish(link, identity).await {
                    tracing::warn!(error = %e, "Failed to refresh availability");
                }
            }
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(error = %e, "Failed to publish state");
            }
        }

        match encode_document(
            &identity.sensor_topic,
            &SensorDocument::from(reading),
            self.payload_budget,
        ) {
            Ok(payload) => match link
                .publish(&identity.sensor_topic, &payload, Qos::AtMostOnce, false)
                .await
            {
                Ok(()) => {
                    stats.success += 1;
                    tracing::debug!(topic = %identity.sensor_topic, "Published legacy document");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(error = %e, "Failed to publish legacy document");
                }
            },
            Err(e) => {
                stats.failed += 1;
                tracing::error!(error = %e, "Dropping legacy document");
            }
        }

        stats
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published documents.
    pub success: usize,
    /// Number of failed or dropped documents.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

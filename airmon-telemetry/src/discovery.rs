//! Home Assistant MQTT discovery.
//!
//! One retained registration document per channel, published at most once
//! per connection epoch.

use std::time::Duration;

use serde::Serialize;

use airmon_common::topics;

use crate::identity::DeviceIdentity;
use crate::link::{BrokerLink, Qos};
use crate::publisher::PublishStats;
use crate::session::ConnectionState;

/// Display name used when no hostname is configured.
pub const DEFAULT_DEVICE_NAME: &str = "IKEA Air Monitor";

const DEVICE_MODEL: &str = "IKEA Air Monitor";
const DEVICE_MANUFACTURER: &str = "DIY";
const FIRMWARE_VERSION: &str = "1.0";

/// A measurement exposed as a Home Assistant sensor entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Key in the native state document and last topic segment.
    pub id: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub icon: &'static str,
}

/// Every channel announced by the monitor, in publication order.
pub const CHANNELS: [Channel; 9] = [
    Channel {
        id: "pm25",
        name: "PM2.5",
        unit: Some("µg/m³"),
        device_class: Some("pm25"),
        state_class: Some("measurement"),
        icon: "mdi:air-filter",
    },
    Channel {
        id: "temperature",
        name: "Temperature",
        unit: Some("°C"),
        device_class: Some("temperature"),
        state_class: Some("measurement"),
        icon: "mdi:thermometer",
    },
    Channel {
        id: "humidity",
        name: "Humidity",
        unit: Some("%"),
        device_class: Some("humidity"),
        state_class: Some("measurement"),
        icon: "mdi:water-percent",
    },
    Channel {
        id: "pressure",
        name: "Pressure",
        unit: Some("hPa"),
        device_class: Some("pressure"),
        state_class: Some("measurement"),
        icon: "mdi:gauge",
    },
    Channel {
        id: "aqi",
        name: "AQI",
        unit: None,
        device_class: Some("aqi"),
        state_class: Some("measurement"),
        icon: "mdi:air-purifier",
    },
    Channel {
        id: "aqi_category",
        name: "AQI Category",
        unit: None,
        device_class: None,
        state_class: None,
        icon: "mdi:signal",
    },
    Channel {
        id: "dew_point",
        name: "Dew Point",
        unit: Some("°C"),
        device_class: Some("temperature"),
        state_class: Some("measurement"),
        icon: "mdi:water-thermometer",
    },
    Channel {
        id: "comfort_index",
        name: "Comfort Index",
        unit: None,
        device_class: None,
        state_class: Some("measurement"),
        icon: "mdi:emoticon-happy",
    },
    Channel {
        id: "uptime",
        name: "Uptime",
        unit: Some("s"),
        device_class: Some("duration"),
        state_class: Some("total_increasing"),
        icon: "mdi:timer-outline",
    },
];

/// Device record shared by every entity of the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescription<'a> {
    pub identifiers: [String; 1],
    pub name: &'a str,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub sw_version: &'static str,
}

/// Registration document for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDocument<'a> {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: &'a str,
    pub value_template: String,
    pub availability_topic: &'a str,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    pub device: DeviceDescription<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    pub icon: &'static str,
    pub expire_after: u64,
}

/// Builds and publishes the registration documents.
#[derive(Debug, Clone)]
pub struct DiscoveryPublisher {
    device_name: String,
    expire_after: Duration,
}

impl DiscoveryPublisher {
    /// Create a publisher announcing `hostname` (or the default name when empty).
    pub fn new(hostname: &str, expire_after: Duration) -> Self {
        let device_name = if hostname.is_empty() {
            DEFAULT_DEVICE_NAME.to_string()
        } else {
            hostname.to_string()
        };

        Self {
            device_name,
            expire_after,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build the registration document of one channel.
    pub fn document<'a>(
        &'a self,
        identity: &'a DeviceIdentity,
        channel: &Channel,
    ) -> DiscoveryDocument<'a> {
        DiscoveryDocument {
            name: channel.name,
            unique_id: topics::entity_id(&identity.unique_id, channel.id),
            state_topic: &identity.state_topic,
            value_template: format!("{{{{ value_json.{} }}}}", channel.id),
            availability_topic: &identity.availability_topic,
            payload_available: "online",
            payload_not_available: "offline",
            device: DeviceDescription {
                identifiers: [topics::device_id(&identity.unique_id)],
                name: &self.device_name,
                model: DEVICE_MODEL,
                manufacturer: DEVICE_MANUFACTURER,
                sw_version: FIRMWARE_VERSION,
            },
            unit_of_measurement: channel.unit,
            device_class: channel.device_class,
            state_class: channel.state_class,
            icon: channel.icon,
            expire_after: self.expire_after.as_secs(),
        }
    }

    /// Publish every registration document, retained.
    ///
    /// Does nothing when the link is down or discovery already ran in this
    /// epoch. A failing channel is logged and the rest are still attempted;
    /// the epoch counts as announced either way.
    pub async fn publish_all<L: BrokerLink>(
        &self,
        link: &mut L,
        identity: &DeviceIdentity,
        state: &mut ConnectionState,
    ) -> PublishStats {
        let mut stats = PublishStats::default();

        if state.discovery_done || !link.is_connected() {
            return stats;
        }

        for channel in &CHANNELS {
            let topic = topics::discovery_config(&identity.discovery_prefix, channel.id);

            let payload = match serde_json::to_vec(&self.document(identity, channel)) {
                Ok(payload) => payload,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(channel = channel.id, error = %e, "Failed to encode discovery document");
                    continue;
                }
            };

            match link.publish(&topic, &payload, Qos::AtMostOnce, true).await {
                Ok(()) => {
                    stats.success += 1;
                    tracing::debug!(channel = channel.id, topic = %topic, "Published discovery");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(channel = channel.id, error = %e, "Failed to publish discovery");
                }
            }
        }

        state.discovery_done = true;
        tracing::info!(
            published = stats.success,
            failed = stats.failed,
            "Discovery announced"
        );

        stats
    }
}

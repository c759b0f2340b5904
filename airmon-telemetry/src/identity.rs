//! Device identity derived from the network hardware address.

use airmon_common::topics::{self, TopicBuilder};

/// Names under which the monitor appears on the broker.
///
/// Resolved once per process from the first readable hardware address and
/// stable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Lowercase hex of the hardware address (12 characters).
    pub unique_id: String,
    pub base_topic: String,
    pub discovery_prefix: String,
    pub client_id: String,
    pub state_topic: String,
    pub sensor_topic: String,
    pub availability_topic: String,
}

impl DeviceIdentity {
    /// Derive every name from a hardware address and the configured base topic.
    ///
    /// An empty `configured_topic` generates `ikea_air_monitor/<unique id>`.
    pub fn resolve(hardware_address: [u8; 6], configured_topic: &str) -> Self {
        let unique_id = format_unique_id(hardware_address);
        let topics = TopicBuilder::configured_or_generated(configured_topic, &unique_id);

        Self {
            discovery_prefix: topics::discovery_prefix(&unique_id),
            client_id: topics::device_id(&unique_id),
            base_topic: topics.base_topic().to_string(),
            state_topic: topics.state(),
            sensor_topic: topics.sensor(),
            availability_topic: topics.status(),
            unique_id,
        }
    }
}

/// Format a hardware address as 12 lowercase hex characters, no separators.
pub fn format_unique_id(hardware_address: [u8; 6]) -> String {
    hardware_address
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// An all-zero address means the interface has not reported one yet.
pub fn is_unset(hardware_address: &[u8; 6]) -> bool {
    hardware_address.iter().all(|&byte| byte == 0)
}

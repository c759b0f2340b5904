//! MQTT topic builders.
//!
//! Topics follow the Tasmota-style telemetry layout:
//!
//! ```text
//! tele/<base_topic>/state     native JSON document
//! tele/<base_topic>/SENSOR    legacy-compatible JSON document
//! tele/<base_topic>/status    availability ("online" / "offline")
//! homeassistant/sensor/ikea_air_monitor_<id>/<channel>/config
//! ```

/// Slug used for generated topics, client ids and discovery identifiers.
pub const DEVICE_SLUG: &str = "ikea_air_monitor";

/// Root of all telemetry topics.
pub const TELEMETRY_ROOT: &str = "tele";

/// Home Assistant discovery namespace for sensor entities.
pub const DISCOVERY_ROOT: &str = "homeassistant/sensor";

/// Builder for the telemetry topics under one base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    base_topic: String,
}

impl TopicBuilder {
    /// Create a builder for a base topic.
    pub fn new(base_topic: impl Into<String>) -> Self {
        Self {
            base_topic: base_topic.into(),
        }
    }

    /// Create a builder from the configured topic, falling back to a
    /// generated one when the configured topic is empty.
    ///
    /// # Example
    /// ```
    /// use airmon_common::topics::TopicBuilder;
    ///
    /// let builder = TopicBuilder::configured_or_generated("", "a1b2c3d4e5f6");
    /// assert_eq!(builder.base_topic(), "ikea_air_monitor/a1b2c3d4e5f6");
    ///
    /// let builder = TopicBuilder::configured_or_generated("livingroom", "a1b2c3d4e5f6");
    /// assert_eq!(builder.base_topic(), "livingroom");
    /// ```
    pub fn configured_or_generated(configured: &str, unique_id: &str) -> Self {
        if configured.is_empty() {
            Self::new(format!("{}/{}", DEVICE_SLUG, unique_id))
        } else {
            Self::new(configured)
        }
    }

    /// Get the base topic.
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Topic carrying the native state document.
    ///
    /// # Example
    /// ```
    /// use airmon_common::topics::TopicBuilder;
    ///
    /// assert_eq!(TopicBuilder::new("kitchen").state(), "tele/kitchen/state");
    /// ```
    pub fn state(&self) -> String {
        self.telemetry("state")
    }

    /// Topic carrying the legacy-compatible document.
    pub fn sensor(&self) -> String {
        self.telemetry("SENSOR")
    }

    /// Availability topic (also used as the last-will topic).
    pub fn status(&self) -> String {
        self.telemetry("status")
    }

    fn telemetry(&self, leaf: &str) -> String {
        format!("{}/{}/{}", TELEMETRY_ROOT, self.base_topic, leaf)
    }
}

/// Discovery prefix for a device.
///
/// # Example
/// ```
/// use airmon_common::topics::discovery_prefix;
///
/// assert_eq!(
///     discovery_prefix("a1b2c3d4e5f6"),
///     "homeassistant/sensor/ikea_air_monitor_a1b2c3d4e5f6"
/// );
/// ```
pub fn discovery_prefix(unique_id: &str) -> String {
    format!("{}/{}_{}", DISCOVERY_ROOT, DEVICE_SLUG, unique_id)
}

/// Discovery config topic for one channel.
pub fn discovery_config(prefix: &str, channel: &str) -> String {
    format!("{}/{}/config", prefix, channel)
}

/// Device-level identifier (client id and discovery device identifier).
pub fn device_id(unique_id: &str) -> String {
    format!("{}_{}", DEVICE_SLUG, unique_id)
}

/// Entity-level unique id for one channel.
pub fn entity_id(unique_id: &str, channel: &str) -> String {
    format!("{}_{}_{}", DEVICE_SLUG, unique_id, channel)
}

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Smallest payload budget that still fits the native state document.
pub const MIN_PAYLOAD_BUDGET: usize = 128;

/// Complete monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirmonConfig {
    /// Device identity settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// MQTT broker settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Connection and publication timers.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Sensor acquisition settings.
    #[serde(default)]
    pub sensors: SensorConfig,

    /// Secondary HTTP delivery.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name announced in discovery documents.
    /// Empty uses "IKEA Air Monitor".
    #[serde(default)]
    pub hostname: String,

    /// Network interface whose hardware address identifies the device.
    /// Use "auto" to pick the first non-loopback interface (default).
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_interface() -> String {
    "auto".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            interface: default_interface(),
        }
    }
}

/// MQTT broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host. Empty disables MQTT telemetry entirely.
    #[serde(default)]
    pub host: String,

    /// Broker port (default: 1883).
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Username. Credentials are only sent when this is non-empty.
    #[serde(default)]
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Base topic. Empty generates `ikea_air_monitor/<device id>`.
    #[serde(default)]
    pub topic: String,

    /// Keep-alive interval in seconds (default: 60).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Maximum MQTT packet size in bytes (default: 1024).
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Maximum serialized size of a data document in bytes (default: 384).
    #[serde(default = "default_payload_budget")]
    pub payload_budget: usize,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    1024
}

fn default_payload_budget() -> usize {
    384
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            username: String::new(),
            password: String::new(),
            topic: String::new(),
            keep_alive_secs: default_keep_alive(),
            max_packet_size: default_max_packet_size(),
            payload_budget: default_payload_budget(),
        }
    }
}

impl MqttConfig {
    /// Whether a broker is configured at all.
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }
}

/// Timer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum time between two connection attempts (default: 10).
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Interval of the availability heartbeat (default: 60).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Total handshake window of one connection attempt (default: 5000).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Longest a single tick may wait on the handshake (default: 250).
    #[serde(default = "default_connect_step")]
    pub connect_step_ms: u64,

    /// Driver loop period (default: 100).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Sensor sampling and publication period (default: 30).
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Longest a tick may spend servicing broker I/O (default: 20).
    #[serde(default = "default_service_budget")]
    pub service_budget_ms: u64,
}

fn default_reconnect_interval() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_connect_step() -> u64 {
    250
}

fn default_tick_interval() -> u64 {
    100
}

fn default_sample_interval() -> u64 {
    30
}

fn default_service_budget() -> u64 {
    20
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_secs: default_reconnect_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            connect_timeout_ms: default_connect_timeout(),
            connect_step_ms: default_connect_step(),
            tick_interval_ms: default_tick_interval(),
            sample_interval_secs: default_sample_interval(),
            service_budget_ms: default_service_budget(),
        }
    }
}

impl TimingConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_step(&self) -> Duration {
        Duration::from_millis(self.connect_step_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn service_budget(&self) -> Duration {
        Duration::from_millis(self.service_budget_ms)
    }
}

/// Sensor acquisition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Serial port of the PM1006 particulate sensor.
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    /// Serial baud rate (default: 9600).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// IIO device directory of the temperature/humidity/pressure sensor.
    #[serde(default = "default_iio_device")]
    pub iio_device: String,

    /// Offset added to the measured temperature in °C.
    #[serde(default)]
    pub temp_offset: f32,

    /// Offset added to the measured PM2.5 concentration in µg/m³.
    #[serde(default)]
    pub pm25_calibration: f32,
}

fn default_serial_port() -> String {
    "/dev/ttyS0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_iio_device() -> String {
    "/sys/bus/iio/devices/iio:device0".to_string()
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            iio_device: default_iio_device(),
            temp_offset: 0.0,
            pm25_calibration: 0.0,
        }
    }
}

/// Secondary HTTP delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Receiver host. Empty disables HTTP delivery.
    #[serde(default)]
    pub host: String,

    /// Receiver port (default: 1880).
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Request path (default: "/airmon").
    #[serde(default = "default_http_path")]
    pub path: String,

    /// Request timeout in milliseconds (default: 2000).
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

fn default_http_port() -> u16 {
    1880
}

fn default_http_path() -> String {
    "/airmon".to_string()
}

fn default_http_timeout() -> u64 {
    2000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_http_port(),
            path: default_http_path(),
            timeout_ms: default_http_timeout(),
        }
    }
}

impl HttpConfig {
    /// Whether HTTP delivery is configured.
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }

    /// Full receiver URL.
    pub fn url(&self) -> String {
        if self.path.starts_with('/') {
            format!("http://{}:{}{}", self.host, self.port, self.path)
        } else {
            format!("http://{}:{}/{}", self.host, self.port, self.path)
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AirmonConfig {
    /// Load and validate a configuration file in JSON5 format.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;

        if timing.reconnect_interval_secs == 0 {
            return Err(Error::validation("reconnect_interval_secs must be > 0"));
        }
        if timing.heartbeat_interval_secs == 0 {
            return Err(Error::validation("heartbeat_interval_secs must be > 0"));
        }
        if timing.connect_timeout_ms == 0 || timing.connect_step_ms == 0 {
            return Err(Error::validation(
                "connect_timeout_ms and connect_step_ms must be > 0",
            ));
        }
        if timing.connect_step_ms > timing.connect_timeout_ms {
            return Err(Error::validation(
                "connect_step_ms must not exceed connect_timeout_ms",
            ));
        }
        if timing.tick_interval_ms == 0 || timing.sample_interval_secs == 0 {
            return Err(Error::validation(
                "tick_interval_ms and sample_interval_secs must be > 0",
            ));
        }

        if self.mqtt.is_enabled() && self.mqtt.port == 0 {
            return Err(Error::validation("mqtt.port must be > 0"));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(Error::validation("mqtt.keep_alive_secs must be > 0"));
        }
        if self.mqtt.max_packet_size < self.mqtt.payload_budget {
            return Err(Error::validation(
                "mqtt.max_packet_size must not be smaller than mqtt.payload_budget",
            ));
        }
        if self.mqtt.payload_budget < MIN_PAYLOAD_BUDGET {
            return Err(Error::validation(format!(
                "mqtt.payload_budget must be at least {} bytes",
                MIN_PAYLOAD_BUDGET
            )));
        }

        if self.http.is_enabled() && self.http.port == 0 {
            return Err(Error::validation("http.port must be > 0"));
        }

        Ok(())
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config: AirmonConfig = parse_config("{}").unwrap();

        assert!(!config.mqtt.is_enabled());
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.payload_budget, 384);
        assert_eq!(config.device.interface, "auto");
        assert_eq!(config.timing.heartbeat_interval_secs, 60);
        assert_eq!(config.timing.connect_timeout(), Duration::from_secs(5));
        assert!(!config.http.is_enabled());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let json5 = r#"
        {
            device: { hostname: "Bedroom", interface: "wlan0" },
            mqtt: {
                host: "broker.local",
                port: 8883,
                username: "airmon",
                password: "secret",
                topic: "bedroom/air",
            },
            timing: {
                reconnect_interval_secs: 30,
                heartbeat_interval_secs: 120,
                connect_step_ms: 100,
            },
            sensors: {
                serial_port: "/dev/ttyUSB0",
                temp_offset: -1.5,
            },
            http: { host: "nodered.local", path: "sensor" },
            logging: { level: "debug", format: "json" },
        }
        "#;

        let config: AirmonConfig = parse_config(json5).unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.hostname, "Bedroom");
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.topic, "bedroom/air");
        assert_eq!(config.timing.reconnect_interval(), Duration::from_secs(30));
        assert_eq!(config.timing.heartbeat_interval(), Duration::from_secs(120));
        assert_eq!(config.sensors.baud_rate, 9600);
        assert_eq!(config.sensors.temp_offset, -1.5);
        assert_eq!(config.http.url(), "http://nodered.local:1880/sensor");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_zero_interval() {
        let config: AirmonConfig =
            parse_config("{ timing: { heartbeat_interval_secs: 0 } }").unwrap();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_step_exceeds_timeout() {
        let config: AirmonConfig =
            parse_config("{ timing: { connect_timeout_ms: 100, connect_step_ms: 500 } }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_payload_budget() {
        let config: AirmonConfig = parse_config("{ mqtt: { payload_budget: 64 } }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_url_keeps_leading_slash() {
        let http = HttpConfig {
            host: "10.0.0.2".to_string(),
            ..HttpConfig::default()
        };
        assert_eq!(http.url(), "http://10.0.0.2:1880/airmon");
    }

    #[test]
    fn test_load_missing_file() {
        let result = AirmonConfig::load("/nonexistent/airmon.json5");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

//! airmon Telemetry
//!
//! MQTT connectivity and publication for the IKEA air monitor.
//!
//! # Overview
//!
//! This crate provides:
//! - [`Telemetry`], the non-blocking core: session state machine, Home
//!   Assistant discovery, heartbeat and reading publication
//! - [`BrokerLink`] and [`NetworkTransport`], the seams to the broker and the
//!   network, with [`RumqttLink`] and [`SystemNetwork`] as real implementations
//! - [`TelemetryRunner`] for driving the core from sensors until Ctrl+C
//! - [`HttpSink`] for the secondary binary HTTP delivery
//! - [`MonitorArgs`] for CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use airmon_telemetry::{SnapshotSource, run_monitor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     run_monitor("airmon.json5", |config| Ok(MySensors::open(config)?)).await
//! }
//! ```

mod args;
mod discovery;
mod error;
mod heartbeat;
mod http;
mod identity;
mod link;
mod mqtt;
mod network;
mod publisher;
mod runner;
mod session;
mod status;
mod telemetry;
pub mod testing;

pub use args::MonitorArgs;
pub use discovery::{CHANNELS, Channel, DEFAULT_DEVICE_NAME, DiscoveryDocument, DiscoveryPublisher};
pub use error::{Result, TelemetryError};
pub use heartbeat::Heartbeat;
pub use http::{HttpSink, SNAPSHOT_LEN, encode_snapshot};
pub use identity::{DeviceIdentity, format_unique_id};
pub use link::{
    BrokerLink, ConnectFailure, ConnectRequest, ConnectStatus, Credentials, LastWill,
    NetworkTransport, Qos,
};
pub use mqtt::RumqttLink;
pub use network::{SystemNetwork, select_interface};
pub use publisher::{
    PendingSnapshot, PublicationEngine, PublishOutcome, PublishStats, SensorDocument,
    StateDocument, encode_document,
};
pub use runner::{SnapshotSource, TelemetryRunner, run_monitor};
pub use session::{ConnectionState, SessionManager, SessionPhase};
pub use status::Availability;
pub use telemetry::{Telemetry, TelemetrySettings};

// Re-export commonly used types from airmon-common
pub use airmon_common::{AirmonConfig, DerivedMetrics, Reading, SensorSnapshot};

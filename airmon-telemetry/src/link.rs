//! Seams between the telemetry core and the outside world.
//!
//! The session manager and publication engine only talk to a broker through
//! [`BrokerLink`] and ask about the network through [`NetworkTransport`], so
//! both can be replaced by in-memory doubles in tests.

use std::fmt;
use std::time::Duration;

use crate::Result;

/// MQTT quality of service used by the telemetry core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// QoS 0
    AtMostOnce,
    /// QoS 1
    AtLeastOnce,
}

/// Username/password pair sent in the CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Message the broker publishes on our behalf if the session dies uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

/// Everything needed to open a broker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub max_packet_size: usize,
    /// Only present when a username is configured.
    pub credentials: Option<Credentials>,
    pub last_will: LastWill,
}

/// Why a handshake did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The broker answered with a refusal code.
    Rejected(String),
    /// The transport failed before the broker answered.
    Transport(String),
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::Rejected(code) => write!(f, "rejected by broker: {}", code),
            ConnectFailure::Transport(msg) => write!(f, "transport failure: {}", msg),
        }
    }
}

/// Progress of a handshake after one bounded step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Still waiting for the broker.
    Connecting,
    /// The broker accepted the session.
    Connected,
    /// The attempt is over.
    Failed(ConnectFailure),
}

/// A connection to an MQTT broker.
///
/// Implementations never block longer than the duration they are handed:
/// the caller drives the handshake and background I/O in bounded steps.
#[allow(async_fn_in_trait)]
pub trait BrokerLink {
    /// Start a new handshake, discarding any previous session.
    fn begin_connect(&mut self, request: &ConnectRequest) -> Result<()>;

    /// Advance the handshake started by [`BrokerLink::begin_connect`], waiting at most `step`.
    async fn poll_connect(&mut self, step: Duration) -> ConnectStatus;

    /// Whether an established session is believed to be alive.
    fn is_connected(&self) -> bool;

    /// Publish a payload on the current session.
    async fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool)
    -> Result<()>;

    /// Process keep-alive and inbound traffic for at most `budget`.
    async fn service(&mut self, budget: Duration);

    /// Drop the session without a DISCONNECT packet. The broker will
    /// deliver the last will once it notices.
    fn reset(&mut self);

    /// Flush queued messages and close the session cleanly within `budget`.
    async fn disconnect(&mut self, budget: Duration);
}

/// The network interface the monitor is attached to.
pub trait NetworkTransport {
    /// Whether the interface is up and able to reach the broker.
    fn is_ready(&mut self) -> bool;

    /// Hardware address of the interface, if it can be read.
    fn hardware_address(&mut self) -> Option<[u8; 6]>;
}

//! In-memory doubles for [`BrokerLink`] and [`NetworkTransport`].

use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::link::{BrokerLink, ConnectFailure, ConnectRequest, ConnectStatus, NetworkTransport, Qos};

/// One publish attempt seen by a [`MemoryLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
    /// The link was connected and accepted the message.
    pub delivered: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// How a [`MemoryLink`] answers handshakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Accept on the first poll.
    Accept,
    /// Stay pending for this many polls, then accept.
    AcceptAfter(u32),
    /// Refuse with a broker code.
    Reject(String),
    /// Fail at the transport level on every poll.
    Unreachable(String),
    /// Never answer.
    Hang,
}

/// Scripted broker link that records every publish.
#[derive(Debug)]
pub struct MemoryLink {
    handshake: Handshake,
    handshaking: bool,
    polls: u32,
    connected: bool,
    fail_publishes: bool,
    requests: Vec<ConnectRequest>,
    published: Vec<PublishedMessage>,
    service_calls: usize,
    clean_disconnects: usize,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLink {
    /// A link whose broker accepts every handshake immediately.
    pub fn new() -> Self {
        Self::with_handshake(Handshake::Accept)
    }

    pub fn with_handshake(handshake: Handshake) -> Self {
        Self {
            handshake,
            handshaking: false,
            polls: 0,
            connected: false,
            fail_publishes: false,
            requests: Vec::new(),
            published: Vec::new(),
            service_calls: 0,
            clean_disconnects: 0,
        }
    }

    /// Change how future handshakes are answered.
    pub fn set_handshake(&mut self, handshake: Handshake) {
        self.handshake = handshake;
    }

    /// Simulate the broker going away.
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Make every publish fail while the link stays up.
    pub fn fail_publishes(&mut self, fail: bool) {
        self.fail_publishes = fail;
    }

    /// Connect requests received so far, one per handshake started.
    pub fn requests(&self) -> &[ConnectRequest] {
        &self.requests
    }

    /// Every publish attempt, delivered or not.
    pub fn published(&self) -> &[PublishedMessage] {
        &self.published
    }

    /// Delivered messages on one topic.
    pub fn delivered_to(&self, topic: &str) -> Vec<&PublishedMessage> {
        self.published
            .iter()
            .filter(|m| m.delivered && m.topic == topic)
            .collect()
    }

    /// Delivered messages whose topic starts with `prefix`.
    pub fn delivered_under(&self, prefix: &str) -> Vec<&PublishedMessage> {
        self.published
            .iter()
            .filter(|m| m.delivered && m.topic.starts_with(prefix))
            .collect()
    }

    /// Forget recorded publishes.
    pub fn clear_published(&mut self) {
        self.published.clear();
    }

    pub fn service_calls(&self) -> usize {
        self.service_calls
    }

    pub fn clean_disconnects(&self) -> usize {
        self.clean_disconnects
    }
}

impl BrokerLink for MemoryLink {
    fn begin_connect(&mut self, request: &ConnectRequest) -> Result<()> {
        self.requests.push(request.clone());
        self.connected = false;
        self.handshaking = true;
        self.polls = 0;
        Ok(())
    }

    async fn poll_connect(&mut self, step: Duration) -> ConnectStatus {
        if !self.handshaking {
            return ConnectStatus::Failed(ConnectFailure::Transport(
                "no handshake in progress".to_string(),
            ));
        }
        self.polls += 1;

        match self.handshake.clone() {
            Handshake::Accept => {}
            Handshake::AcceptAfter(pending) if self.polls > pending => {}
            Handshake::AcceptAfter(_) | Handshake::Hang => {
                tokio::time::sleep(step).await;
                return ConnectStatus::Connecting;
            }
            Handshake::Reject(code) => {
                self.handshaking = false;
                return ConnectStatus::Failed(ConnectFailure::Rejected(code));
            }
            Handshake::Unreachable(message) => {
                self.handshaking = false;
                tokio::time::sleep(step).await;
                return ConnectStatus::Failed(ConnectFailure::Transport(message));
            }
        }

        self.handshaking = false;
        self.connected = true;
        ConnectStatus::Connected
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<()> {
        let delivered = self.connected && !self.fail_publishes;
        self.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
            delivered,
        });

        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        if self.fail_publishes {
            return Err(TelemetryError::publish(topic, "publish refused"));
        }
        Ok(())
    }

    async fn service(&mut self, _budget: Duration) {
        self.service_calls += 1;
    }

    fn reset(&mut self) {
        self.connected = false;
        self.handshaking = false;
    }

    async fn disconnect(&mut self, _budget: Duration) {
        if self.connected {
            self.clean_disconnects += 1;
        }
        self.reset();
    }
}

/// Network whose readiness and address are set by the test.
#[derive(Debug, Clone)]
pub struct StaticNetwork {
    ready: bool,
    address: Option<[u8; 6]>,
}

impl StaticNetwork {
    /// A ready network with the given hardware address.
    pub fn new(address: [u8; 6]) -> Self {
        Self {
            ready: true,
            address: Some(address),
        }
    }

    /// A network that is down and has no address yet.
    pub fn down() -> Self {
        Self {
            ready: false,
            address: None,
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_address(&mut self, address: Option<[u8; 6]>) {
        self.address = address;
    }
}

impl NetworkTransport for StaticNetwork {
    fn is_ready(&mut self) -> bool {
        self.ready
    }

    fn hardware_address(&mut self) -> Option<[u8; 6]> {
        self.address
    }
}

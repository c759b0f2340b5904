//! [`BrokerLink`] backed by rumqttc.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};

use crate::error::{Result, TelemetryError};
use crate::link::{BrokerLink, ConnectFailure, ConnectRequest, ConnectStatus, Qos};

/// Requests the client may queue before the event loop drains them.
const DEFAULT_CAPACITY: usize = 32;

/// What the event loop task reports back to the link.
#[derive(Debug, Clone)]
enum LinkEvent {
    /// CONNACK received.
    ConnAck(ConnectReturnCode),
    /// The broker refused the session.
    Refused(ConnectReturnCode),
    /// The session ended: transport error or broker DISCONNECT.
    Lost(String),
    /// Our DISCONNECT packet went out.
    Closed,
}

/// MQTT v3.1.1 link.
///
/// Each handshake gets its own event loop task, which owns the socket and
/// reports over a channel. The handshake therefore keeps going between
/// [`BrokerLink::poll_connect`] steps, and the task stops at the first error
/// instead of reconnecting on its own, leaving reconnection to the caller.
/// Publishes are queued without waiting.
pub struct RumqttLink {
    client: Option<AsyncClient>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    task: Option<JoinHandle<()>>,
    connected: bool,
    capacity: usize,
}

impl Default for RumqttLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RumqttLink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a link whose request queue holds `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            client: None,
            events: None,
            task: None,
            connected: false,
            capacity,
        }
    }
}

impl Drop for RumqttLink {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Poll the event loop until the session ends, forwarding what the link cares about.
async fn run_event_loop(mut eventloop: EventLoop, events: mpsc::UnboundedSender<LinkEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => LinkEvent::ConnAck(ack.code),
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(topic = %publish.topic, "Ignoring inbound publish");
                continue;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                LinkEvent::Lost("broker closed the session".to_string())
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => LinkEvent::Closed,
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) => LinkEvent::Refused(code),
            Err(e) => LinkEvent::Lost(e.to_string()),
        };

        let last = !matches!(event, LinkEvent::ConnAck(ConnectReturnCode::Success));
        if events.send(event).is_err() || last {
            break;
        }
    }
}

fn options(request: &ConnectRequest) -> MqttOptions {
    let mut options = MqttOptions::new(&request.client_id, &request.host, request.port);
    options.set_keep_alive(request.keep_alive);
    options.set_clean_session(true);
    options.set_max_packet_size(request.max_packet_size, request.max_packet_size);

    if let Some(credentials) = &request.credentials {
        options.set_credentials(&credentials.username, &credentials.password);
    }

    let will = &request.last_will;
    options.set_last_will(rumqttc::LastWill::new(
        &will.topic,
        will.payload.clone(),
        to_qos(will.qos),
        will.retain,
    ));

    options
}

fn to_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Readable form of a CONNACK refusal.
fn describe_return_code(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unacceptable protocol version",
        ConnectReturnCode::BadClientId => "client identifier rejected",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad user name or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}

impl BrokerLink for RumqttLink {
    fn begin_connect(&mut self, request: &ConnectRequest) -> Result<()> {
        if request.host.is_empty() {
            return Err(TelemetryError::Connect("broker host is empty".to_string()));
        }

        self.reset();
        let (client, eventloop) = AsyncClient::new(options(request), self.capacity);
        let (tx, rx) = mpsc::unbounded_channel();

        self.task = Some(tokio::spawn(run_event_loop(eventloop, tx)));
        self.client = Some(client);
        self.events = Some(rx);
        Ok(())
    }

    async fn poll_connect(&mut self, step: Duration) -> ConnectStatus {
        let Some(events) = self.events.as_mut() else {
            return ConnectStatus::Failed(ConnectFailure::Transport(
                "no handshake in progress".to_string(),
            ));
        };

        let deadline = Instant::now() + step;
        let status = loop {
            match timeout_at(deadline, events.recv()).await {
                Err(_) => return ConnectStatus::Connecting,
                Ok(Some(LinkEvent::ConnAck(ConnectReturnCode::Success))) => {
                    break ConnectStatus::Connected;
                }
                Ok(Some(LinkEvent::ConnAck(code) | LinkEvent::Refused(code))) => {
                    break ConnectStatus::Failed(ConnectFailure::Rejected(
                        describe_return_code(code).to_string(),
                    ));
                }
                Ok(Some(LinkEvent::Lost(reason))) => {
                    break ConnectStatus::Failed(ConnectFailure::Transport(reason));
                }
                Ok(Some(LinkEvent::Closed)) => continue,
                Ok(None) => {
                    break ConnectStatus::Failed(ConnectFailure::Transport(
                        "event loop stopped".to_string(),
                    ));
                }
            }
        };

        match status {
            ConnectStatus::Connected => self.connected = true,
            _ => self.reset(),
        }
        status
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
        let client = match &self.client {
            Some(client) if self.connected => client,
            _ => return Err(TelemetryError::NotConnected),
        };

        client
            .try_publish(topic, to_qos(qos), retain, payload.to_vec())
            .map_err(|e| TelemetryError::publish(topic, e.to_string()))
    }

    /// Apply what the event loop task reported since the last call.
    ///
    /// Keep-alive and inbound traffic run in that task, so this only yields
    /// once to let it catch up and never waits for the whole budget.
    async fn service(&mut self, _budget: Duration) {
        tokio::task::yield_now().await;

        let Some(events) = self.events.as_mut() else {
            return;
        };

        let mut lost = None;
        loop {
            match events.try_recv() {
                Ok(LinkEvent::Lost(reason)) => lost = Some(reason),
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    lost.get_or_insert_with(|| "event loop stopped".to_string());
                    break;
                }
            }
        }

        if let Some(reason) = lost {
            if self.connected {
                tracing::warn!(reason = %reason, "MQTT session ended");
            }
            self.connected = false;
        }
    }

    fn reset(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.client = None;
        self.events = None;
        self.connected = false;
    }

    async fn disconnect(&mut self, budget: Duration) {
        if let Some(client) = &self.client {
            if let Err(e) = client.try_disconnect() {
                tracing::debug!(error = %e, "Failed to queue MQTT disconnect");
            }
        }

        if let Some(events) = self.events.as_mut() {
            // Wait until queued publishes and the DISCONNECT packet are out.
            let deadline = Instant::now() + budget;
            while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
                if matches!(event, LinkEvent::Closed | LinkEvent::Lost(_)) {
                    break;
                }
            }
        }

        self.reset();
    }
}

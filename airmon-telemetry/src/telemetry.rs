//! The telemetry core: one object owning the broker link, the session state
//! and the publication buffer.

use std::time::Duration;

use tokio::time::Instant;

use airmon_common::{AirmonConfig, Reading};

use crate::discovery::DiscoveryPublisher;
use crate::identity::{self, DeviceIdentity};
use crate::link::{
    BrokerLink, ConnectFailure, ConnectRequest, ConnectStatus, Credentials, LastWill,
    NetworkTransport, Qos,
};
use crate::publisher::{PendingSnapshot, PublicationEngine, PublishOutcome, PublishStats};
use crate::session::{ConnectionState, SessionManager, SessionPhase};
use crate::status::Availability;

/// Settings the core needs, extracted from [`AirmonConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Configured base topic, empty to generate one.
    pub topic: String,
    pub hostname: String,
    pub keep_alive: Duration,
    pub max_packet_size: usize,
    pub payload_budget: usize,
    pub reconnect_interval: Duration,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub connect_step: Duration,
    pub service_budget: Duration,
}

impl TelemetrySettings {
    pub fn from_config(config: &AirmonConfig) -> Self {
        let mqtt = &config.mqtt;
        let timing = &config.timing;

        Self {
            host: mqtt.host.clone(),
            port: mqtt.port,
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            topic: mqtt.topic.clone(),
            hostname: config.device.hostname.clone(),
            keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
            max_packet_size: mqtt.max_packet_size,
            payload_budget: mqtt.payload_budget,
            reconnect_interval: timing.reconnect_interval(),
            heartbeat_interval: timing.heartbeat_interval(),
            connect_timeout: timing.connect_timeout(),
            connect_step: timing.connect_step(),
            service_budget: timing.service_budget(),
        }
    }

    /// Whether a broker is configured.
    pub fn broker_enabled(&self) -> bool {
        !self.host.is_empty()
    }

    fn connect_request(&self, identity: &DeviceIdentity) -> ConnectRequest {
        let credentials = (!self.username.is_empty()).then(|| Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        });

        ConnectRequest {
            client_id: identity.client_id.clone(),
            host: self.host.clone(),
            port: self.port,
            keep_alive: self.keep_alive,
            max_packet_size: self.max_packet_size,
            credentials,
            last_will: LastWill {
                topic: identity.availability_topic.clone(),
                payload: Availability::Offline.payload().to_vec(),
                qos: Qos::AtLeastOnce,
                retain: true,
            },
        }
    }
}

/// MQTT telemetry for one monitor.
///
/// Drive it by calling [`Telemetry::tick`] from the main loop and hand it
/// readings through [`Telemetry::publish`]. Neither call blocks longer than
/// one configured step.
///
/// # Example
///
/// ```
/// use airmon_common::AirmonConfig;
/// use airmon_telemetry::testing::{MemoryLink, StaticNetwork};
/// use airmon_telemetry::{SessionPhase, Telemetry, TelemetrySettings};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut config = AirmonConfig::default();
/// config.mqtt.host = "broker.local".to_string();
///
/// let mut telemetry = Telemetry::new(
///     TelemetrySettings::from_config(&config),
///     MemoryLink::new(),
///     StaticNetwork::new([0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]),
/// );
///
/// assert_eq!(telemetry.tick().await, SessionPhase::Connected);
/// # }
/// ```
pub struct Telemetry<L, N> {
    link: L,
    network: N,
    settings: TelemetrySettings,
    identity: Option<DeviceIdentity>,
    session: SessionManager,
    discovery: DiscoveryPublisher,
    engine: PublicationEngine,
}

impl<L: BrokerLink, N: NetworkTransport> Telemetry<L, N> {
    pub fn new(settings: TelemetrySettings, link: L, network: N) -> Self {
        let session = SessionManager::new(settings.reconnect_interval, settings.heartbeat_interval);
        let discovery = DiscoveryPublisher::new(
            &settings.hostname,
            session.state().heartbeat.expire_after(),
        );
        let engine = PublicationEngine::new(settings.payload_budget);

        Self {
            link,
            network,
            settings,
            identity: None,
            session,
            discovery,
            engine,
        }
    }

    pub fn settings(&self) -> &TelemetrySettings {
        &self.settings
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    /// Identity, once resolved by the first connection attempt.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn state(&self) -> &ConnectionState {
        self.session.state()
    }

    pub fn pending(&self) -> &PendingSnapshot {
        self.engine.pending()
    }

    /// Whether readings are currently published rather than buffered.
    pub fn is_connected(&self) -> bool {
        self.session.state().connected && self.link.is_connected()
    }

    /// Advance the session by one step.
    ///
    /// Detects link loss, rate-limits reconnection, drives an in-flight
    /// handshake for at most one connect step, and while connected services
    /// the link and keeps the heartbeat going.
    pub async fn tick(&mut self) -> SessionPhase {
        let now = Instant::now();

        if let SessionPhase::Connecting { started } = self.session.phase() {
            return self.continue_connect(started).await;
        }

        if !self.link.is_connected() {
            if self.session.state().connected {
                self.handle_link_lost(now).await;
            }
            return self.try_reconnect(now).await;
        }

        if !self.session.state().connected {
            // The link came up without a handshake of ours; treat it as a new epoch.
            self.on_connected(now).await;
        }

        self.link.service(self.settings.service_budget).await;
        if !self.link.is_connected() {
            // Picked up on the next tick.
            return self.session.phase();
        }

        let now = Instant::now();
        if self.session.heartbeat_due(now) {
            if let Some(identity) = &self.identity {
                match Availability::Online.publish(&mut self.link, identity).await {
                    Ok(()) => tracing::debug!("Heartbeat published"),
                    Err(e) => tracing::warn!(error = %e, "Failed to publish heartbeat"),
                }
            }
            self.session.state_mut().heartbeat.reset(now);
        }

        self.session.phase()
    }

    /// Publish a reading, or buffer it until the next connection.
    pub async fn publish(&mut self, reading: Reading) -> PublishOutcome {
        let connected = self.is_connected();
        self.engine
            .publish(&mut self.link, self.identity.as_ref(), connected, reading)
            .await
    }

    /// Announce discovery for the current epoch if it has not been yet.
    pub async fn publish_discovery(&mut self) -> PublishStats {
        let Some(identity) = &self.identity else {
            return PublishStats::default();
        };
        self.discovery
            .publish_all(&mut self.link, identity, self.session.state_mut())
            .await
    }

    /// Publish `offline` and close the session cleanly.
    pub async fn shutdown(&mut self) {
        if self.link.is_connected() {
            if let Some(identity) = &self.identity {
                if let Err(e) = Availability::Offline.publish(&mut self.link, identity).await {
                    tracing::warn!(error = %e, "Failed to publish offline status");
                }
            }
            self.link.disconnect(self.settings.connect_step).await;
            tracing::info!("Disconnected from MQTT broker");
        }
        self.session.mark_failed();
    }

    async fn handle_link_lost(&mut self, now: Instant) {
        tracing::warn!("MQTT connection lost");

        if let Some(identity) = &self.identity {
            // The link has already reported the loss, so a real broker link
            // rejects this with `NotConnected`. The last will covers that case.
            if let Err(e) = Availability::Offline.publish(&mut self.link, identity).await {
                tracing::debug!(error = %e, "Offline status not delivered");
            }
        }

        self.link.reset();
        self.session.mark_lost(now);
    }

    async fn try_reconnect(&mut self, now: Instant) -> SessionPhase {
        if !self.settings.broker_enabled() || !self.session.reconnect_due(now) {
            return SessionPhase::Disconnected;
        }
        self.session.record_attempt(now);

        if !self.network.is_ready() {
            tracing::debug!("Network not ready, skipping MQTT connection attempt");
            return SessionPhase::Disconnected;
        }

        let Some(identity) = self.resolve_identity() else {
            tracing::debug!("Hardware address not available yet");
            return SessionPhase::Disconnected;
        };

        let request = self.settings.connect_request(&identity);
        if let Err(e) = self.link.begin_connect(&request) {
            tracing::warn!(error = %e, "Failed to start MQTT connection");
            return SessionPhase::Disconnected;
        }

        tracing::info!(
            host = %self.settings.host,
            port = self.settings.port,
            client_id = %request.client_id,
            "Connecting to MQTT broker"
        );
        self.session.start_connecting(now);
        self.continue_connect(now).await
    }

    async fn continue_connect(&mut self, started: Instant) -> SessionPhase {
        let remaining = self
            .settings
            .connect_timeout
            .saturating_sub(Instant::now().saturating_duration_since(started));
        if remaining.is_zero() {
            return self.abandon_connect("handshake window exhausted");
        }

        let step = self.settings.connect_step.min(remaining);
        match self.link.poll_connect(step).await {
            ConnectStatus::Connected => {
                self.on_connected(Instant::now()).await;
                SessionPhase::Connected
            }
            ConnectStatus::Connecting => {
                if Instant::now().saturating_duration_since(started) >= self.settings.connect_timeout
                {
                    self.abandon_connect("handshake window exhausted")
                } else {
                    SessionPhase::Connecting { started }
                }
            }
            ConnectStatus::Failed(ConnectFailure::Rejected(code)) => {
                tracing::warn!(code = %code, "MQTT connection rejected");
                self.link.reset();
                self.session.mark_failed();
                SessionPhase::Disconnected
            }
            ConnectStatus::Failed(ConnectFailure::Transport(message)) => {
                tracing::debug!(error = %message, "MQTT connection attempt failed");
                self.retry_within_window(started)
            }
        }
    }

    /// Start another handshake inside the same window after a transport error.
    fn retry_within_window(&mut self, started: Instant) -> SessionPhase {
        if Instant::now().saturating_duration_since(started) >= self.settings.connect_timeout {
            return self.abandon_connect("transport failures until window end");
        }

        let Some(identity) = &self.identity else {
            return self.abandon_connect("identity unavailable");
        };
        let request = self.settings.connect_request(identity);
        match self.link.begin_connect(&request) {
            Ok(()) => SessionPhase::Connecting { started },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to restart MQTT connection");
                self.link.reset();
                self.session.mark_failed();
                SessionPhase::Disconnected
            }
        }
    }

    fn abandon_connect(&mut self, reason: &str) -> SessionPhase {
        tracing::warn!(
            reason,
            retry_in = ?self.settings.reconnect_interval,
            "MQTT connection failed"
        );
        self.link.reset();
        self.session.mark_failed();
        SessionPhase::Disconnected
    }

    async fn on_connected(&mut self, now: Instant) {
        self.session.mark_connected(now);

        let Some(identity) = &self.identity else {
            return;
        };
        tracing::info!(base_topic = %identity.base_topic, "Connected to MQTT broker");

        if let Err(e) = Availability::Online.publish(&mut self.link, identity).await {
            tracing::warn!(error = %e, "Failed to publish online status");
        }

        self.discovery
            .publish_all(&mut self.link, identity, self.session.state_mut())
            .await;
        self.session.state_mut().heartbeat.reset(now);

        self.engine.flush(&mut self.link, identity).await;
    }

    /// Resolve the identity on first use; it never changes afterwards.
    fn resolve_identity(&mut self) -> Option<DeviceIdentity> {
        if let Some(identity) = &self.identity {
            return Some(identity.clone());
        }

        let address = self.network.hardware_address()?;
        if identity::is_unset(&address) {
            return None;
        }

        let identity = DeviceIdentity::resolve(address, &self.settings.topic);
        tracing::info!(
            unique_id = %identity.unique_id,
            base_topic = %identity.base_topic,
            "Device identity resolved"
        );
        self.identity = Some(identity.clone());
        Some(identity)
    }
}

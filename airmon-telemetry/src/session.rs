//! Broker session bookkeeping.
//!
//! [`SessionManager`] only tracks state and timers. The I/O that moves it
//! between phases lives in [`crate::Telemetry::tick`].

use std::time::Duration;

use tokio::time::Instant;

use crate::heartbeat::Heartbeat;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session and no handshake in flight.
    Disconnected,
    /// A handshake is in flight; `started` bounds its window.
    Connecting { started: Instant },
    /// The broker accepted the session.
    Connected,
}

/// Connection facts shared by discovery, heartbeat and publication.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub connected: bool,
    /// Rate-limits connection attempts. `None` until the first attempt.
    pub last_reconnect_attempt: Option<Instant>,
    pub heartbeat: Heartbeat,
    /// Discovery was announced in the current epoch.
    pub discovery_done: bool,
}

/// Tracks the session phase and the timers that gate transitions.
#[derive(Debug, Clone)]
pub struct SessionManager {
    phase: SessionPhase,
    state: ConnectionState,
    reconnect_interval: Duration,
}

impl SessionManager {
    pub fn new(reconnect_interval: Duration, heartbeat_interval: Duration) -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            state: ConnectionState {
                connected: false,
                last_reconnect_attempt: None,
                heartbeat: Heartbeat::new(heartbeat_interval),
                discovery_done: false,
            },
            reconnect_interval,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    /// Whether enough time has passed since the last attempt to try again.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        match self.state.last_reconnect_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.reconnect_interval,
        }
    }

    /// Consume one reconnect slot, whether or not a handshake follows.
    pub fn record_attempt(&mut self, now: Instant) {
        self.state.last_reconnect_attempt = Some(now);
    }

    pub fn start_connecting(&mut self, now: Instant) {
        self.phase = SessionPhase::Connecting { started: now };
    }

    /// Enter a new connection epoch.
    pub fn mark_connected(&mut self, now: Instant) {
        self.phase = SessionPhase::Connected;
        self.state.connected = true;
        self.state.discovery_done = false;
        self.state.heartbeat.reset(now);
    }

    /// The handshake failed or its window ran out.
    pub fn mark_failed(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.state.connected = false;
        self.state.discovery_done = false;
    }

    /// An established session was lost. The next attempt waits a full
    /// reconnect interval from `now`.
    pub fn mark_lost(&mut self, now: Instant) {
        self.phase = SessionPhase::Disconnected;
        self.state.connected = false;
        self.state.discovery_done = false;
        self.state.last_reconnect_attempt = Some(now);
    }

    /// Whether the heartbeat should be republished.
    pub fn heartbeat_due(&self, now: Instant) -> bool {
        self.state.connected && self.state.heartbeat.is_due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(10), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_immediate() {
        let session = manager();
        assert!(session.reconnect_due(Instant::now()));
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_rate_limited() {
        let mut session = manager();
        let start = Instant::now();

        session.record_attempt(start);
        assert!(!session.reconnect_due(start + Duration::from_secs(9)));
        assert!(session.reconnect_due(start + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_starts_new_epoch() {
        let mut session = manager();
        let now = Instant::now();
        session.state_mut().discovery_done = true;

        session.start_connecting(now);
        assert_eq!(session.phase(), SessionPhase::Connecting { started: now });

        session.mark_connected(now);
        assert_eq!(session.phase(), SessionPhase::Connected);
        assert!(session.state().connected);
        assert!(!session.state().discovery_done);
        assert!(!session.heartbeat_due(now));
        assert!(session.heartbeat_due(now + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_defers_reconnect() {
        let mut session = manager();
        let now = Instant::now();
        session.mark_connected(now);
        session.state_mut().discovery_done = true;

        let lost_at = now + Duration::from_secs(300);
        session.mark_lost(lost_at);

        assert!(!session.state().connected);
        assert!(!session.state().discovery_done);
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(!session.reconnect_due(lost_at + Duration::from_secs(5)));
        assert!(session.reconnect_due(lost_at + Duration::from_secs(10)));
        assert!(!session.heartbeat_due(lost_at + Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_clears_epoch() {
        let mut session = manager();
        let now = Instant::now();
        session.mark_connected(now);
        session.state_mut().discovery_done = true;

        session.mark_failed();

        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(!session.state().connected);
        assert!(!session.state().discovery_done);
    }
}

use std::time::Duration;

use tokio::time::Instant;

/// Periodic re-assertion of the retained "online" availability.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    /// Create a heartbeat whose first beat is due one interval from now.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time of the last beat (or reset).
    pub fn last(&self) -> Instant {
        self.last
    }

    /// Whether a full interval has elapsed since the last beat.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    /// Staleness window announced in discovery documents: two missed beats.
    pub fn expire_after(&self) -> Duration {
        self.interval * 2
    }
}

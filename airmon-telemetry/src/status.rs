//! Availability reporting.

use std::fmt;

use crate::Result;
use crate::identity::DeviceIdentity;
use crate::link::{BrokerLink, Qos};

/// Value of the retained availability topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// Payload published on the availability topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }

    /// Payload as bytes.
    pub fn payload(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Publish this availability, retained, on the device's availability topic.
    pub async fn publish<L: BrokerLink>(
        &self,
        link: &mut L,
        identity: &DeviceIdentity,
    ) -> Result<()> {
        link.publish(
            &identity.availability_topic,
            self.payload(),
            Qos::AtMostOnce,
            true,
        )
        .await
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_payloads() {
        assert_eq!(Availability::Online.as_str(), "online");
        assert_eq!(Availability::Offline.payload(), b"offline");
        assert_eq!(Availability::Offline.to_string(), "offline");
    }
}

//! [`NetworkTransport`] backed by the host's network interfaces.

use sysinfo::Networks;

use crate::identity;
use crate::link::NetworkTransport;

/// Interface name that selects the first usable interface.
pub const AUTO_INTERFACE: &str = "auto";

/// Network state read through sysinfo.
pub struct SystemNetwork {
    interface: String,
    networks: Networks,
}

impl SystemNetwork {
    /// Watch `interface`, or the first non-loopback interface for `"auto"`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn current(&mut self) -> Option<(String, [u8; 6])> {
        self.networks.refresh(true);
        let candidates = self
            .networks
            .list()
            .iter()
            .map(|(name, data)| (name.clone(), data.mac_address().0));
        select_interface(candidates, &self.interface)
    }
}

/// Pick the watched interface from `(name, hardware address)` pairs.
///
/// A named interface is returned whatever its address. `"auto"` picks the
/// alphabetically first interface with a non-zero address, skipping loopback.
pub fn select_interface(
    candidates: impl IntoIterator<Item = (String, [u8; 6])>,
    wanted: &str,
) -> Option<(String, [u8; 6])> {
    if wanted != AUTO_INTERFACE {
        return candidates.into_iter().find(|(name, _)| name == wanted);
    }

    candidates
        .into_iter()
        .filter(|(name, address)| name != "lo" && !identity::is_unset(address))
        .min_by(|a, b| a.0.cmp(&b.0))
}

#[cfg(target_os = "linux")]
fn link_is_up(name: &str) -> bool {
    std::fs::read_to_string(format!("/sys/class/net/{}/operstate", name))
        .map(|state| state.trim() == "up")
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn link_is_up(_name: &str) -> bool {
    true
}

impl NetworkTransport for SystemNetwork {
    fn is_ready(&mut self) -> bool {
        match self.current() {
            Some((name, address)) => !identity::is_unset(&address) && link_is_up(&name),
            None => false,
        }
    }

    fn hardware_address(&mut self) -> Option<[u8; 6]> {
        self.current().map(|(_, address)| address)
    }
}

//! Host and port records accumulated during a scan session.
//!
//! Records are created once from the expanded target list and mutated in
//! place by the sweep merges. Everything exposed publicly is read-only.

use pnet::datalink::MacAddr;
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::services::ServiceMap;
use crate::types::Port;

/// Outcome of one TCP connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortProbeResult {
    /// The port that was probed.
    pub port: Port,
    /// Whether the handshake completed.
    pub open: bool,
    /// OS error code for the failed attempt, 0 when open.
    pub reason: i32,
}

impl PortProbeResult {
    pub fn open(port: Port) -> Self {
        Self {
            port,
            open: true,
            reason: 0,
        }
    }

    pub fn closed(port: Port, reason: i32) -> Self {
        Self {
            port,
            open: false,
            reason,
        }
    }
}

/// A port result paired with its expected service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEntry<'a> {
    pub result: PortProbeResult,
    pub service: &'a str,
}

/// Everything known about one target host.
#[derive(Debug, Clone)]
pub struct HostRecord {
    address: Ipv4Addr,
    alive: bool,
    mac: Option<MacAddr>,
    requested: Vec<Port>,
    results: Vec<PortProbeResult>,
}

impl HostRecord {
    pub fn new(address: Ipv4Addr, requested: Vec<Port>) -> Self {
        Self {
            address,
            alive: false,
            mac: None,
            requested,
            results: Vec::new(),
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// True once the host answered an echo request or was port scanned.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.mac
    }

    /// Ports this host was asked to be scanned on.
    pub fn requested_ports(&self) -> &[Port] {
        &self.requested
    }

    /// Raw probe results in merge order.
    pub fn port_results(&self) -> &[PortProbeResult] {
        &self.results
    }

    /// Open ports, ascending.
    pub fn active_ports(&self) -> Vec<PortProbeResult> {
        let mut open: Vec<PortProbeResult> = self.results.iter().filter(|r| r.open).copied().collect();
        open.sort_by_key(|r| r.port);
        open
    }

    /// Every probed port regardless of state, ascending.
    pub fn all_ports(&self) -> Vec<PortProbeResult> {
        let mut all = self.results.clone();
        all.sort_by_key(|r| r.port);
        all
    }

    /// Open ports annotated with service names.
    pub fn active_entries<'a>(&self, services: &'a ServiceMap) -> Vec<PortEntry<'a>> {
        annotate(self.active_ports(), services)
    }

    /// All probed ports annotated with service names.
    pub fn all_entries<'a>(&self, services: &'a ServiceMap) -> Vec<PortEntry<'a>> {
        annotate(self.all_ports(), services)
    }

    pub(crate) fn set_ping_result(&mut self, alive: bool, mac: Option<MacAddr>) {
        self.alive = alive;
        self.mac = mac;
    }

    pub(crate) fn mark_alive(&mut self) {
        self.alive = true;
    }

    pub(crate) fn clear_ports(&mut self) {
        self.results.clear();
    }

    pub(crate) fn extend_ports(&mut self, results: impl IntoIterator<Item = PortProbeResult>) {
        self.results.extend(results);
    }
}

fn annotate(results: Vec<PortProbeResult>, services: &ServiceMap) -> Vec<PortEntry<'_>> {
    results
        .into_iter()
        .map(|result| PortEntry {
            result,
            service: services.name_for(result.port),
        })
        .collect()
}

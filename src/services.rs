//! Port to service-name lookup.
//!
//! Service lists use the `name port/protocol` line format of nmap's
//! `nmap-services` file. Only TCP entries are kept, and entries literally
//! named `unknown` are skipped.

use std::collections::BTreeMap;

use crate::types::Port;

/// Label used when a port has no known service.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Service list compiled into the binary.
const BUNDLED_SERVICES: &str = include_str!("../data/known-services");

/// Read-only mapping from TCP port to service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMap {
    services: BTreeMap<u16, String>,
}

impl ServiceMap {
    /// Parse a service list. Malformed lines are ignored.
    pub fn parse(content: &str) -> Self {
        let mut services = BTreeMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, proto)) = port_proto.split_once('/') else {
                continue;
            };
            if name == UNKNOWN_SERVICE || proto != "tcp" {
                continue;
            }
            if let Ok(port) = port.parse::<u16>() {
                services.insert(port, name.to_string());
            }
        }

        Self { services }
    }

    /// The list shipped with the binary.
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_SERVICES)
    }

    /// Service name for a port, or `"unknown"`.
    pub fn name_for(&self, port: Port) -> &str {
        self.services
            .get(&port.as_u16())
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_SERVICE)
    }

    /// Every known port below `limit`, ascending.
    pub fn ports_below(&self, limit: u16) -> Vec<Port> {
        self.services
            .range(..limit)
            .filter_map(|(&port, _)| Port::new(port))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

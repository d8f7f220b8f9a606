//! Output formatting module.
//!
//! Renders a finished session as plain text, JSON, or CSV. Every renderer
//! writes to a caller-supplied writer; the `print_*` helpers target stdout.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::write_csv;
pub use json_format::write_json;
pub use plain::{print_error, print_info, write_plain, SPLITTER};

use serde::Serialize;
use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::error::CliResult;
use crate::model::{HostRecord, PortEntry};
use crate::services::ServiceMap;

/// Requested port lists shorter than this are shown in full in verbose mode.
pub const VERBOSE_PORT_LIMIT: usize = 64;

/// Which port results a report includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortView {
    /// Open ports only.
    Active,
    /// Every probed port, open or closed.
    All,
}

impl PortView {
    /// Full listings only pay off for short port lists.
    pub fn choose(verbose: bool, port_count: usize) -> Self {
        if verbose && port_count < VERBOSE_PORT_LIMIT {
            Self::All
        } else {
            Self::Active
        }
    }

    fn entries<'a>(self, host: &HostRecord, services: &'a ServiceMap) -> Vec<PortEntry<'a>> {
        match self {
            Self::Active => host.active_entries(services),
            Self::All => host.all_entries(services),
        }
    }
}

/// One port line of a structured report.
#[derive(Debug, Clone, Serialize)]
pub struct PortRow<'a> {
    pub port: u16,
    pub service: &'a str,
    pub open: bool,
    pub reason: i32,
}

/// One host of a structured report.
#[derive(Debug, Clone, Serialize)]
pub struct HostRow<'a> {
    pub address: String,
    pub alive: bool,
    pub mac: Option<String>,
    pub ports: Vec<PortRow<'a>>,
}

/// Hosts worth reporting under `view`, with their port rows.
///
/// The active view skips hosts with nothing open; the full view skips hosts
/// that were never probed.
pub fn host_rows<'a>(hosts: &[HostRecord], services: &'a ServiceMap, view: PortView) -> Vec<HostRow<'a>> {
    hosts
        .iter()
        .filter_map(|host| {
            let entries = view.entries(host, services);
            if entries.is_empty() {
                return None;
            }
            Some(HostRow {
                address: host.address().to_string(),
                alive: host.is_alive(),
                mac: host.mac().map(|mac| mac.to_string()),
                ports: entries
                    .into_iter()
                    .map(|entry| PortRow {
                        port: entry.result.port.as_u16(),
                        service: entry.service,
                        open: entry.result.open,
                        reason: entry.result.reason,
                    })
                    .collect(),
            })
        })
        .collect()
}

/// Render hosts in the requested format.
pub fn write_results<W: Write>(
    out: &mut W,
    hosts: &[HostRecord],
    services: &ServiceMap,
    view: PortView,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Plain => write_plain(out, hosts, services, view)?,
        OutputFormat::Json => write_json(out, hosts, services, view)?,
        OutputFormat::Csv => write_csv(out, hosts, services, view)?,
    }
    Ok(())
}

/// Render hosts to stdout.
pub fn print_results(
    hosts: &[HostRecord],
    services: &ServiceMap,
    view: PortView,
    format: OutputFormat,
) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_results(&mut out, hosts, services, view, format)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::PortProbeResult;
    use crate::types::Port;
    use std::net::Ipv4Addr;

    pub fn port(n: u16) -> Port {
        Port::new(n).unwrap()
    }

    /// Two scanned hosts (one with a MAC and an open port) and one untouched.
    pub fn hosts() -> (Vec<HostRecord>, ServiceMap) {
        let services = ServiceMap::parse("ssh 22/tcp\nhttp 80/tcp\n");
        let requested = vec![port(22), port(80), port(8080)];

        let mut web = HostRecord::new(Ipv4Addr::new(10, 0, 0, 5), requested.clone());
        web.set_ping_result(true, Some("02:00:00:00:00:05".parse().unwrap()));
        web.extend_ports([
            PortProbeResult::closed(port(8080), libc::ECONNREFUSED),
            PortProbeResult::open(port(80)),
            PortProbeResult::closed(port(22), libc::ETIMEDOUT),
        ]);

        let mut quiet = HostRecord::new(Ipv4Addr::new(10, 0, 0, 6), requested.clone());
        quiet.extend_ports([PortProbeResult::closed(port(22), libc::ECONNREFUSED)]);
        quiet.mark_alive();

        let untouched = HostRecord::new(Ipv4Addr::new(10, 0, 0, 7), requested);
        (vec![web, quiet, untouched], services)
    }
}

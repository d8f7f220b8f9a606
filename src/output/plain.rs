//! Plain text output formatting.
//!
//! Line-oriented listing of hosts and their ports, colored when the
//! terminal supports it.

use console::style;
use std::io::{self, Write};

use super::PortView;
use crate::model::HostRecord;
use crate::services::ServiceMap;

/// Rule printed around result blocks and between sweep phases.
pub const SPLITTER: &str = "------------------------";

/// Write one block per reported host.
pub fn write_plain<W: Write>(
    out: &mut W,
    hosts: &[HostRecord],
    services: &ServiceMap,
    view: PortView,
) -> io::Result<()> {
    writeln!(out, "{}", style(SPLITTER).dim())?;

    let mut any_open = false;
    for host in hosts {
        let entries = view.entries(host, services);
        if entries.is_empty() {
            continue;
        }

        let mac = host
            .mac()
            .map_or_else(|| "MAC UNKNOWN".to_string(), |mac| mac.to_string());
        writeln!(out, "Host: {} ({})", style(host.address()).bold(), mac)?;

        for entry in entries {
            let state = if entry.result.open {
                any_open = true;
                style("Open").green().bold()
            } else {
                style("Closed").red()
            };
            writeln!(out, "Port {} ({}): {}", entry.result.port, entry.service, state)?;
        }
    }

    if !any_open {
        writeln!(out, "No open ports found")?;
    }
    writeln!(out, "{}", style(SPLITTER).dim())?;
    Ok(())
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

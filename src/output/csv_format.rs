//! CSV output formatting.

use std::io::Write;

use super::{host_rows, PortView};
use crate::model::HostRecord;
use crate::services::ServiceMap;

/// Write one CSV row per reported port.
pub fn write_csv<W: Write>(
    out: &mut W,
    hosts: &[HostRecord],
    services: &ServiceMap,
    view: PortView,
) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["address", "mac", "alive", "port", "service", "state", "reason"])?;

    for host in host_rows(hosts, services, view) {
        for port in &host.ports {
            wtr.write_record([
                host.address.as_str(),
                host.mac.as_deref().unwrap_or(""),
                if host.alive { "true" } else { "false" },
                &port.port.to_string(),
                port.service,
                if port.open { "open" } else { "closed" },
                &port.reason.to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

//! JSON output formatting.

use serde::Serialize;
use std::io::{self, Write};

use super::{host_rows, HostRow, PortView};
use crate::model::HostRecord;
use crate::services::ServiceMap;

#[derive(Serialize)]
struct JsonReport<'a> {
    scanned: usize,
    hosts: Vec<HostRow<'a>>,
}

/// Write results as a pretty-printed JSON document.
pub fn write_json<W: Write>(
    out: &mut W,
    hosts: &[HostRecord],
    services: &ServiceMap,
    view: PortView,
) -> io::Result<()> {
    let report = JsonReport {
        scanned: hosts.len(),
        hosts: host_rows(hosts, services, view),
    };
    serde_json::to_writer_pretty(&mut *out, &report).map_err(io::Error::other)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures;

    #[test]
    fn test_json_document() {
        let (hosts, services) = fixtures::hosts();
        let mut out = Vec::new();
        write_json(&mut out, &hosts, &services, PortView::All).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["scanned"], 3);
        assert_eq!(doc["hosts"].as_array().unwrap().len(), 2);
        assert_eq!(doc["hosts"][0]["address"], "10.0.0.5");
        assert_eq!(doc["hosts"][0]["ports"][1]["port"], 80);
        assert_eq!(doc["hosts"][0]["ports"][1]["open"], true);
        assert_eq!(doc["hosts"][1]["mac"], serde_json::Value::Null);
    }
}

//! Port scan worker.
//!
//! One worker scans its share of hosts against its share of ports. Results
//! for a host are kept even if the sweep is cancelled half way through it.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::ScanResult;
use crate::model::PortProbeResult;
use crate::monitor::ScanMonitor;
use crate::scanner::partition::PortWork;
use crate::scanner::ping::pause;
use crate::scanner::traits::PortProber;

/// Probe results for one host from one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPorts {
    pub address: Ipv4Addr,
    pub results: Vec<PortProbeResult>,
}

/// Scan every (host, port) pair in `work`.
///
/// A structural probe failure such as socket exhaustion aborts the worker;
/// the error carries no partial results, so the caller keeps what other
/// workers produced.
pub async fn port_worker<P>(prober: Arc<P>, work: PortWork, monitor: Arc<ScanMonitor>) -> ScanResult<Vec<HostPorts>>
where
    P: PortProber + ?Sized,
{
    let token = monitor.cancellation();
    let delay = monitor.delay();
    let mut scanned = Vec::with_capacity(work.hosts.len());

    for address in work.hosts {
        if !monitor.is_enabled() {
            break;
        }

        let mut results = Vec::with_capacity(work.ports.len());
        let mut interrupted = false;
        for &port in &work.ports {
            if !monitor.is_enabled() {
                interrupted = true;
                break;
            }
            let probe = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    interrupted = true;
                    break;
                }
                probe = prober.connect(address, port) => probe,
            };
            match probe {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(%address, %port, error = %e, "port worker aborted");
                    return Err(e);
                }
            }
        }

        monitor.record_ports(results.len());
        let open = results.iter().filter(|r| r.open).count();
        debug!(%address, probed = results.len(), open, "host scanned");
        if !results.is_empty() {
            scanned.push(HostPorts { address, results });
        }

        if interrupted {
            break;
        }
        monitor.record_host_share(address);

        if !pause(delay, &token).await {
            break;
        }
    }
    Ok(scanned)
}

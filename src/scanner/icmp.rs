//! ICMP echo and neighbour-table lookups backed by the host OS.
//!
//! Echo requests go through the kernel's ICMP echo facility via `surge-ping`
//! (unprivileged datagram ping sockets on Linux). Link-layer addresses come
//! from the kernel neighbour table, which a successful echo has just
//! populated.

use async_trait::async_trait;
use pnet::datalink::MacAddr;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError};
use tracing::{debug, info};

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::{EchoProber, EchoReply};

/// Kernel neighbour table on Linux.
const NEIGHBOUR_TABLE: &str = "/proc/net/arp";

/// `ATF_COM`: the entry has a resolved hardware address.
const ATF_COM: u32 = 0x02;

/// Process-wide network resources needed before any echo probe.
///
/// Acquire once per session; dropping the handle releases the ICMP socket.
/// It must outlive every worker that probes through it.
pub struct NetworkSubsystem {
    client: Client,
}

impl NetworkSubsystem {
    /// Open the ICMP socket. Failure here is fatal for the session.
    pub fn init() -> ScanResult<Self> {
        let client = Client::new(&Config::default()).map_err(|e| {
            ScanError::SubsystemInit(format!(
                "cannot open ICMP socket ({e}); check net.ipv4.ping_group_range or run with elevated privileges"
            ))
        })?;
        info!("network subsystem ready");
        Ok(Self { client })
    }
}

#[async_trait]
impl EchoProber for NetworkSubsystem {
    async fn echo(
        &self,
        target: Ipv4Addr,
        payload: &[u8],
        timeout: Duration,
    ) -> ScanResult<EchoReply> {
        let ident = PingIdentifier(rand::random());
        let mut pinger = self.client.pinger(IpAddr::V4(target), ident).await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), payload).await {
            Ok((_packet, rtt)) => {
                debug!(%target, ?rtt, "echo reply");
                Ok(EchoReply::Success)
            }
            Err(e) => classify_ping_error(target, e),
        }
    }

    async fn resolve_mac(&self, target: Ipv4Addr) -> ScanResult<Option<MacAddr>> {
        if !cfg!(target_os = "linux") {
            return Ok(None);
        }
        let table = tokio::fs::read_to_string(NEIGHBOUR_TABLE).await?;
        lookup_neighbour(&table, target)
    }
}

fn classify_ping_error(target: Ipv4Addr, e: SurgeError) -> ScanResult<EchoReply> {
    match e {
        SurgeError::Timeout { .. } => Err(ScanError::ProbeTransient {
            target,
            reason: "no echo reply".into(),
        }),
        // Identifier collision with another in-flight request on this client.
        SurgeError::IdenticalRequests { .. } => Err(ScanError::ProbeTransient {
            target,
            reason: e.to_string(),
        }),
        SurgeError::IOError(e) => classify_io_error(target, e),
        other => Ok(EchoReply::Other(other.to_string())),
    }
}

fn classify_io_error(target: Ipv4Addr, e: io::Error) -> ScanResult<EchoReply> {
    match e.raw_os_error() {
        Some(code) if code == libc::EHOSTUNREACH => Ok(EchoReply::HostUnreachable),
        _ => Err(ScanError::ProbeTransient {
            target,
            reason: e.to_string(),
        }),
    }
}

/// Find `target` in the text of `/proc/net/arp`.
///
/// A missing entry is `Ok(None)`; an entry that exists but never completed
/// resolution is a resolution error.
pub fn lookup_neighbour(table: &str, target: Ipv4Addr) -> ScanResult<Option<MacAddr>> {
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0].parse::<Ipv4Addr>().ok() != Some(target) {
            continue;
        }

        let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).unwrap_or(0);
        let mac: Option<MacAddr> = fields[3].parse().ok();
        return match mac {
            Some(mac) if flags & ATF_COM != 0 && mac != MacAddr::zero() => Ok(Some(mac)),
            _ => Err(ScanError::Resolution {
                host: target.to_string(),
                reason: "neighbour entry incomplete".into(),
            }),
        };
    }
    Ok(None)
}

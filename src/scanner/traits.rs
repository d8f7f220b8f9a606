//! Probe abstractions.
//!
//! The sweep engines only talk to the network through these traits, so the
//! OS-backed probers and synthetic test doubles are interchangeable.

use async_trait::async_trait;
use pnet::datalink::MacAddr;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::ScanResult;
use crate::model::PortProbeResult;
use crate::types::Port;

/// Classified answer to one ICMP echo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoReply {
    /// Echo reply received.
    Success,
    /// The destination host was reported unreachable.
    HostUnreachable,
    /// Any other status; the host is treated as unreachable.
    Other(String),
}

impl fmt::Display for EchoReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::HostUnreachable => write!(f, "destination host unreachable"),
            Self::Other(status) => write!(f, "{}", status),
        }
    }
}

/// Reachability probing: ICMP echo plus link-layer address lookup.
#[async_trait]
pub trait EchoProber: Send + Sync {
    /// Send one echo request and wait up to `timeout` for the answer.
    ///
    /// `Err(ScanError::ProbeTransient)` means no classification was possible
    /// (timeout or a recoverable send failure) and the attempt may be retried.
    async fn echo(&self, target: Ipv4Addr, payload: &[u8], timeout: Duration)
        -> ScanResult<EchoReply>;

    /// Resolve the link-layer address of a host that just answered.
    async fn resolve_mac(&self, target: Ipv4Addr) -> ScanResult<Option<MacAddr>>;
}

/// TCP connect probing.
#[async_trait]
pub trait PortProber: Send + Sync {
    /// Attempt one connection.
    ///
    /// Refused, unreachable and timed-out connections are closed results;
    /// only structural failures such as socket creation are errors.
    async fn connect(&self, target: Ipv4Addr, port: Port) -> ScanResult<PortProbeResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_reply_display() {
        assert_eq!(EchoReply::Success.to_string(), "success");
        assert_eq!(
            EchoReply::HostUnreachable.to_string(),
            "destination host unreachable"
        );
        assert_eq!(
            EchoReply::Other("ttl expired".into()).to_string(),
            "ttl expired"
        );
    }
}

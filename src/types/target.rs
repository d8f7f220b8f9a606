//! Target specifications and their expansion into IPv4 host addresses.
//!
//! A target is one of:
//! - a literal IPv4 address (`10.0.0.5`)
//! - a CIDR block (`192.168.1.0/24`), expanded to the hosts strictly between
//!   the network and broadcast addresses
//! - a hostname, resolved to its first IPv4 address
//!
//! Blocks larger than a /8 are refused with [`TargetError::CidrTooLarge`].

use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Error type for target parsing and expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target format: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("CIDR range too large: {0} addresses (max: {1})")]
    CidrTooLarge(u64, u64),
}

/// A parsed target specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// A single IPv4 address.
    Single(Ipv4Addr),
    /// An IPv4 network block.
    Cidr(Ipv4Network),
    /// A hostname to be resolved.
    Hostname(String),
}

impl TargetSpec {
    /// Largest block accepted for expansion (a /8).
    pub const MAX_CIDR_HOSTS: u64 = 1 << 24;

    /// Maximum hostname length accepted.
    pub const MAX_HOSTNAME_LEN: usize = 253;

    /// Parse a target specification from a string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<Ipv4Addr>() {
            return Ok(Self::Single(ip));
        }

        if looks_like_cidr(s) {
            return parse_cidr(s).map(Self::Cidr);
        }

        if is_valid_hostname(s) {
            return Ok(Self::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Expand this specification into concrete host addresses.
    ///
    /// Hostnames that do not resolve to any IPv4 address yield an empty list
    /// rather than an error. Lookup failures are treated the same way.
    pub async fn expand(&self) -> Vec<Ipv4Addr> {
        match self {
            Self::Single(ip) => vec![*ip],
            Self::Cidr(network) => expand_cidr(*network),
            Self::Hostname(hostname) => resolve_first_ipv4(hostname).await.into_iter().collect(),
        }
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Hostname(hostname) => write!(f, "{}", hostname),
        }
    }
}

/// Expand a network block into host addresses in ascending order.
///
/// A /32 yields its own address. Every other prefix yields the addresses
/// strictly between the network and broadcast address, so a /31 is empty.
pub fn expand_cidr(network: Ipv4Network) -> Vec<Ipv4Addr> {
    if network.prefix() == 32 {
        return vec![network.ip()];
    }

    let first = u32::from(network.network());
    let last = u32::from(network.broadcast());
    if last <= first.saturating_add(1) {
        return Vec::new();
    }
    (first + 1..last).map(Ipv4Addr::from).collect()
}

/// Resolve a hostname to its first IPv4 address, if any.
async fn resolve_first_ipv4(hostname: &str) -> Option<Ipv4Addr> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
    });

    match resolver.lookup_ip(hostname).await {
        Ok(response) => response.iter().find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }),
        Err(e) => {
            debug!(%hostname, error = %e, "hostname did not resolve, dropping target");
            None
        }
    }
}

/// `a.b.c.d/n` with 1-3 digit octets and a 1-2 digit prefix.
fn looks_like_cidr(s: &str) -> bool {
    let Some((quad, prefix)) = s.split_once('/') else {
        return false;
    };
    let digits = |part: &str, max: usize| {
        !part.is_empty() && part.len() <= max && part.bytes().all(|b| b.is_ascii_digit())
    };
    let octets: Vec<&str> = quad.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| digits(o, 3)) && digits(prefix, 2)
}

fn parse_cidr(s: &str) -> Result<Ipv4Network, TargetError> {
    let invalid = || TargetError::InvalidCidr(s.to_string());
    let (quad, prefix) = s.split_once('/').ok_or_else(invalid)?;
    let ip: Ipv4Addr = quad.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let network = Ipv4Network::new(ip, prefix).map_err(|_| invalid())?;

    let size = 1u64 << (32 - u32::from(prefix));
    if size > TargetSpec::MAX_CIDR_HOSTS {
        return Err(TargetError::CidrTooLarge(size, TargetSpec::MAX_CIDR_HOSTS));
    }
    Ok(network)
}

/// Check if a string is a plausible hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > TargetSpec::MAX_HOSTNAME_LEN {
        return false;
    }

    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

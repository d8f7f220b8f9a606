//! Work partitioning for the sweep engines.
//!
//! The ping sweep spreads hosts over workers at random. The port scan picks
//! one of four layouts from the host count, port count and worker count.

use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::types::Port;

/// Clamp a requested worker count: never zero, never more than the work.
pub fn effective_workers(requested: usize, units: usize) -> usize {
    if requested == 0 || units < requested {
        1
    } else {
        requested
    }
}

/// Split hosts into random groups of at most `ceil(H / T)` each, with a
/// random order inside every group.
///
/// The union of the groups is exactly the input, each host once.
pub fn random_host_groups<R>(hosts: &[Ipv4Addr], threads: usize, rng: &mut R) -> Vec<Vec<Ipv4Addr>>
where
    R: Rng + ?Sized,
{
    if hosts.is_empty() {
        return Vec::new();
    }
    let workers = effective_workers(threads, hosts.len());
    let group_size = hosts.len().div_ceil(workers);

    let mut pool = hosts.to_vec();
    pool.shuffle(rng);
    pool.chunks(group_size).map(<[Ipv4Addr]>::to_vec).collect()
}

/// Deal items into `buckets` lists, item `i` going to bucket `i % buckets`.
pub fn round_robin<T: Clone>(items: &[T], buckets: usize) -> Vec<Vec<T>> {
    let buckets = buckets.max(1);
    let mut out = vec![Vec::new(); buckets];
    for (i, item) in items.iter().enumerate() {
        out[i % buckets].push(item.clone());
    }
    out
}

/// How port-scan work is laid out across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStrategy {
    /// Hosts > T and ports > T: split both.
    SplitBoth,
    /// Hosts > T, ports <= T: split hosts, every worker scans all ports.
    SplitHosts,
    /// Hosts <= T, ports > T: split ports, every worker scans all hosts.
    SplitPorts,
    /// Small job: one worker does everything.
    Single,
}

impl PortStrategy {
    pub fn select(hosts: usize, ports: usize, threads: usize) -> Self {
        match (hosts > threads, ports > threads) {
            (true, true) => Self::SplitBoth,
            (true, false) => Self::SplitHosts,
            (false, true) => Self::SplitPorts,
            (false, false) => Self::Single,
        }
    }
}

impl fmt::Display for PortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitBoth => write!(f, "split hosts and ports"),
            Self::SplitHosts => write!(f, "split hosts"),
            Self::SplitPorts => write!(f, "split ports"),
            Self::Single => write!(f, "single worker"),
        }
    }
}

/// What worker `i` scans when both hosts and ports are split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PairingPolicy {
    /// Host bucket `i` against port bucket `i` only. Host/port pairs that fall
    /// into different buckets are never probed.
    #[default]
    IndexMatched,
    /// Host bucket `i` against every port: full coverage.
    CrossProduct,
}

impl fmt::Display for PairingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexMatched => write!(f, "index-matched"),
            Self::CrossProduct => write!(f, "cross-product"),
        }
    }
}

/// One worker's share of a port scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortWork {
    pub hosts: Vec<Ipv4Addr>,
    pub ports: Vec<Port>,
}

impl PortWork {
    /// Number of (host, port) probes this share will issue.
    pub fn probe_count(&self) -> usize {
        self.hosts.len() * self.ports.len()
    }
}

/// Lay out a port scan over `threads` workers.
pub fn plan_port_work(
    hosts: &[Ipv4Addr],
    ports: &[Port],
    threads: usize,
    pairing: PairingPolicy,
) -> (PortStrategy, Vec<PortWork>) {
    let threads = threads.max(1);
    let strategy = PortStrategy::select(hosts.len(), ports.len(), threads);

    let work: Vec<PortWork> = match (strategy, pairing) {
        (PortStrategy::SplitBoth, PairingPolicy::IndexMatched) => round_robin(hosts, threads)
            .into_iter()
            .zip(round_robin(ports, threads))
            .map(|(hosts, ports)| PortWork { hosts, ports })
            .collect(),
        (PortStrategy::SplitBoth, PairingPolicy::CrossProduct) | (PortStrategy::SplitHosts, _) => {
            round_robin(hosts, threads)
                .into_iter()
                .map(|hosts| PortWork {
                    hosts,
                    ports: ports.to_vec(),
                })
                .collect()
        }
        (PortStrategy::SplitPorts, _) => round_robin(ports, threads)
            .into_iter()
            .map(|ports| PortWork {
                hosts: hosts.to_vec(),
                ports,
            })
            .collect(),
        (PortStrategy::Single, _) => vec![PortWork {
            hosts: hosts.to_vec(),
            ports: ports.to_vec(),
        }],
    };

    let work = work
        .into_iter()
        .filter(|w| !w.hosts.is_empty() && !w.ports.is_empty())
        .collect();
    (strategy, work)
}

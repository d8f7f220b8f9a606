//! Scanner module - runs the two sweeps of a scan session.
//!
//! A [`ScanSession`] owns one [`HostRecord`] per target address. The ping
//! sweep fills in liveness and MAC addresses; the port sweep fills in TCP
//! connect results. Each sweep partitions its work over tokio tasks, waits
//! for all of them, then merges what they returned by address.

pub mod icmp;
pub mod partition;
pub mod ping;
pub mod port;
pub mod tcp;
pub mod traits;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::controller;
use crate::error::ScanError;
use crate::model::HostRecord;
use crate::monitor::ScanMonitor;
use crate::types::Port;

pub use icmp::NetworkSubsystem;
pub use partition::{PairingPolicy, PortStrategy};
pub use ping::PingOptions;
pub use tcp::TcpConnectProber;
pub use traits::{EchoProber, EchoReply, PortProber};

use partition::{plan_port_work, random_host_groups};
use ping::{ping_worker, PingOutcome};
use port::{port_worker, HostPorts};

const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Whether a sweep listens to the keyboard while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerMode {
    /// Read `q`/`s` keypresses from the terminal.
    Terminal,
    #[default]
    Disabled,
}

/// Summary of one finished sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Hosts in the session.
    pub hosts: usize,
    /// Distinct hosts with results merged back into the session.
    pub merged: usize,
    /// The operator stopped the sweep early.
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Worker partitions that aborted. Results from the other partitions
    /// are still merged.
    pub failures: Vec<ScanError>,
}

impl SweepReport {
    fn new(hosts: usize) -> Self {
        Self {
            hosts,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

/// Host records plus the shared sweep state.
pub struct ScanSession {
    hosts: Vec<HostRecord>,
    index: HashMap<Ipv4Addr, usize>,
    ports: Vec<Port>,
    threads: usize,
    monitor: Arc<ScanMonitor>,
    controller: ControllerMode,
    progress: bool,
}

impl ScanSession {
    /// Create one record per distinct address, keeping first-seen order.
    pub fn new(
        addresses: impl IntoIterator<Item = Ipv4Addr>,
        ports: Vec<Port>,
        threads: usize,
        delay: Duration,
    ) -> Self {
        let mut hosts = Vec::new();
        let mut index = HashMap::new();
        for address in addresses {
            if index.contains_key(&address) {
                continue;
            }
            index.insert(address, hosts.len());
            hosts.push(HostRecord::new(address, ports.clone()));
        }

        Self {
            hosts,
            index,
            ports,
            threads: threads.max(1),
            monitor: Arc::new(ScanMonitor::new(delay)),
            controller: ControllerMode::default(),
            progress: false,
        }
    }

    pub fn with_controller(mut self, mode: ControllerMode) -> Self {
        self.controller = mode;
        self
    }

    /// Draw a progress bar on stderr while sweeps run.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    pub fn host(&self, address: Ipv4Addr) -> Option<&HostRecord> {
        self.index.get(&address).map(|&i| &self.hosts[i])
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn monitor(&self) -> &Arc<ScanMonitor> {
        &self.monitor
    }

    fn addresses(&self) -> Vec<Ipv4Addr> {
        self.hosts.iter().map(HostRecord::address).collect()
    }

    /// Echo every host and record liveness and MAC addresses.
    pub async fn ping_sweep<P>(&mut self, prober: Arc<P>, options: PingOptions) -> SweepReport
    where
        P: EchoProber + 'static,
    {
        let started = Instant::now();
        let addresses = self.addresses();
        let mut report = SweepReport::new(addresses.len());

        self.monitor.begin_sweep();
        let groups = random_host_groups(&addresses, self.threads, &mut rand::thread_rng());
        info!(hosts = addresses.len(), workers = groups.len(), "starting ping sweep");

        let controller = self.start_controller();
        let progress = self.start_progress(addresses.len());

        let handles: Vec<JoinHandle<Vec<PingOutcome>>> = groups
            .into_iter()
            .map(|group| {
                tokio::spawn(ping_worker(
                    Arc::clone(&prober),
                    group,
                    options,
                    Arc::clone(&self.monitor),
                ))
            })
            .collect();

        for joined in join_all(handles).await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if self.merge_ping(outcome) {
                            report.merged += 1;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "ping worker failed");
                    report.failures.push(ScanError::Worker(e.to_string()));
                }
            }
        }

        self.finish_sweep(&mut report, started, controller, progress).await;
        info!(merged = report.merged, elapsed = ?report.elapsed, "ping sweep finished");
        report
    }

    /// Connect-scan every host on the session's ports.
    ///
    /// Port state from any previous sweep is discarded first. Every host
    /// that produced at least one result is marked alive, pinged or not.
    pub async fn port_sweep<P>(&mut self, prober: Arc<P>, pairing: PairingPolicy) -> SweepReport
    where
        P: PortProber + 'static,
    {
        let started = Instant::now();
        let addresses = self.addresses();
        let mut report = SweepReport::new(addresses.len());

        for host in &mut self.hosts {
            host.clear_ports();
        }
        self.monitor.begin_sweep();

        let (strategy, work) = plan_port_work(&addresses, &self.ports, self.threads, pairing);
        info!(
            hosts = addresses.len(),
            ports = self.ports.len(),
            workers = work.len(),
            %strategy,
            %pairing,
            "starting port sweep"
        );

        let mut shares: HashMap<Ipv4Addr, usize> = HashMap::new();
        for share in &work {
            for &address in &share.hosts {
                *shares.entry(address).or_default() += 1;
            }
        }
        self.monitor.expect_shares(shares);

        let controller = self.start_controller();
        let progress = self.start_progress(addresses.len());

        let mut merged = HashSet::new();
        let handles: Vec<_> = work
            .into_iter()
            .map(|share| tokio::spawn(port_worker(Arc::clone(&prober), share, Arc::clone(&self.monitor))))
            .collect();

        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(batch)) => {
                    for host_ports in batch {
                        let address = host_ports.address;
                        if self.merge_ports(host_ports) {
                            merged.insert(address);
                        }
                    }
                }
                Ok(Err(e)) => {
                    if e.is_fatal() {
                        error!(error = %e, "port sweep cannot continue");
                        self.monitor.cancel();
                    }
                    report.failures.push(e);
                }
                Err(e) => {
                    error!(error = %e, "port worker failed");
                    report.failures.push(ScanError::Worker(e.to_string()));
                }
            }
        }

        report.merged = merged.len();
        self.finish_sweep(&mut report, started, controller, progress).await;
        info!(merged = report.merged, elapsed = ?report.elapsed, "port sweep finished");
        report
    }

    fn merge_ping(&mut self, outcome: PingOutcome) -> bool {
        match self.index.get(&outcome.address) {
            Some(&i) => {
                self.hosts[i].set_ping_result(outcome.alive, outcome.mac);
                true
            }
            None => {
                warn!(address = %outcome.address, "ping result for unknown host");
                false
            }
        }
    }

    fn merge_ports(&mut self, host_ports: HostPorts) -> bool {
        match self.index.get(&host_ports.address) {
            Some(&i) => {
                let host = &mut self.hosts[i];
                host.extend_ports(host_ports.results);
                host.mark_alive();
                true
            }
            None => {
                warn!(address = %host_ports.address, "port results for unknown host");
                false
            }
        }
    }

    fn start_controller(&self) -> Option<JoinHandle<()>> {
        match self.controller {
            ControllerMode::Terminal => Some(controller::spawn(Arc::clone(&self.monitor))),
            ControllerMode::Disabled => None,
        }
    }

    fn start_progress(&self, total: usize) -> Option<(ProgressBar, JoinHandle<()>)> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hosts ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);

        let monitor = Arc::clone(&self.monitor);
        let bar = pb.clone();
        let ticker = tokio::spawn(async move {
            while monitor.is_enabled() {
                bar.set_position(monitor.snapshot().hosts_completed as u64);
                tokio::time::sleep(PROGRESS_TICK).await;
            }
        });
        Some((pb, ticker))
    }

    /// Record how the sweep ended, then stop the controller and progress bar.
    async fn finish_sweep(
        &self,
        report: &mut SweepReport,
        started: Instant,
        controller: Option<JoinHandle<()>>,
        progress: Option<(ProgressBar, JoinHandle<()>)>,
    ) {
        report.cancelled = !self.monitor.is_enabled() && report.failures.iter().all(|e| !e.is_fatal());
        report.elapsed = started.elapsed();
        if report.merged < report.hosts && !report.cancelled && report.failures.is_empty() {
            warn!(merged = report.merged, hosts = report.hosts, "sweep returned fewer results than hosts");
        }

        self.monitor.cancel();
        if let Some(handle) = controller {
            if let Err(e) = handle.await {
                warn!(error = %e, "controller task failed");
            }
        }
        if let Some((pb, ticker)) = progress {
            let _ = ticker.await;
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanResult;
    use crate::model::PortProbeResult;
    use async_trait::async_trait;
    use pnet::datalink::MacAddr;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hosts in the set answer echo requests; everything else is unreachable.
    struct AliveHosts {
        alive: HashSet<Ipv4Addr>,
        mac: MacAddr,
    }

    #[async_trait]
    impl EchoProber for AliveHosts {
        async fn echo(&self, target: Ipv4Addr, _payload: &[u8], _timeout: Duration) -> ScanResult<EchoReply> {
            if self.alive.contains(&target) {
                Ok(EchoReply::Success)
            } else {
                Ok(EchoReply::HostUnreachable)
            }
        }

        async fn resolve_mac(&self, _target: Ipv4Addr) -> ScanResult<Option<MacAddr>> {
            Ok(Some(self.mac))
        }
    }

    /// Ports in the set are open on every host.
    struct OpenPorts {
        open: HashSet<u16>,
        probes: AtomicUsize,
    }

    impl OpenPorts {
        fn new(open: &[u16]) -> Self {
            Self {
                open: open.iter().copied().collect(),
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PortProber for OpenPorts {
        async fn connect(&self, _target: Ipv4Addr, port: Port) -> ScanResult<PortProbeResult> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.open.contains(&port.as_u16()) {
                Ok(PortProbeResult::open(port))
            } else {
                Ok(PortProbeResult::closed(port, libc::ECONNREFUSED))
            }
        }
    }

    /// Cancels the sweep once a number of probes have been issued.
    struct CancelAfter {
        monitor: Arc<ScanMonitor>,
        limit: usize,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl PortProber for CancelAfter {
        async fn connect(&self, _target: Ipv4Addr, port: Port) -> ScanResult<PortProbeResult> {
            if self.probes.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                self.monitor.cancel();
            }
            Ok(PortProbeResult::open(port))
        }
    }

    /// Fails socket creation for one host.
    struct FailsFor(Ipv4Addr);

    #[async_trait]
    impl PortProber for FailsFor {
        async fn connect(&self, target: Ipv4Addr, port: Port) -> ScanResult<PortProbeResult> {
            if target == self.0 {
                return Err(ScanError::SocketCreation {
                    target,
                    source: std::io::Error::from_raw_os_error(libc::EMFILE),
                });
            }
            Ok(PortProbeResult::open(port))
        }
    }

    fn ports(list: &[u16]) -> Vec<Port> {
        list.iter().map(|&p| Port::new(p).unwrap()).collect()
    }

    fn numbers(results: &[PortProbeResult]) -> Vec<u16> {
        results.iter().map(|r| r.port.as_u16()).collect()
    }

    fn hosts(n: u8) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::new(10, 1, 0, i)).collect()
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        let session = ScanSession::new([b, a, b], ports(&[80]), 0, Duration::ZERO);
        let order: Vec<Ipv4Addr> = session.hosts().iter().map(HostRecord::address).collect();
        assert_eq!(order, vec![b, a]);
        assert_eq!(session.threads(), 1);
        assert_eq!(session.host(a).unwrap().requested_ports(), ports(&[80]).as_slice());
    }

    #[tokio::test]
    async fn test_end_to_end_single_host() {
        let target = Ipv4Addr::new(10, 0, 0, 5);
        let mut session = ScanSession::new([target], ports(&[22, 80, 8080]), 4, Duration::ZERO);

        let mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x05);
        let echo = Arc::new(AliveHosts {
            alive: HashSet::from([target]),
            mac,
        });
        let ping = session.ping_sweep(echo, PingOptions::default()).await;
        assert!(ping.is_complete());
        assert_eq!(ping.merged, 1);

        let report = session.port_sweep(Arc::new(OpenPorts::new(&[80])), PairingPolicy::default()).await;
        assert!(report.is_complete());

        let alive: Vec<&HostRecord> = session.hosts().iter().filter(|h| h.is_alive()).collect();
        assert_eq!(alive.len(), 1);
        let host = alive[0];
        assert_eq!(host.mac(), Some(mac));
        assert_eq!(numbers(&host.active_ports()), vec![80]);

        let all = host.all_ports();
        assert_eq!(numbers(&all), vec![22, 80, 8080]);
        assert!(!all[0].open);
        assert!(all[1].open);
        assert!(!all[2].open);
        assert_eq!(all[2].reason, libc::ECONNREFUSED);
    }

    #[tokio::test]
    async fn test_ping_liveness_follows_reply() {
        let targets = hosts(9);
        let alive: HashSet<Ipv4Addr> = targets.iter().step_by(2).copied().collect();
        let mut session = ScanSession::new(targets.clone(), Vec::new(), 3, Duration::ZERO);

        let report = session
            .ping_sweep(
                Arc::new(AliveHosts {
                    alive: alive.clone(),
                    mac: MacAddr::zero(),
                }),
                PingOptions::default(),
            )
            .await;

        assert_eq!(report.merged, 9);
        assert_eq!(session.monitor().snapshot().hosts_completed, 9);
        for host in session.hosts() {
            assert_eq!(host.is_alive(), alive.contains(&host.address()), "{}", host.address());
        }
    }

    #[tokio::test]
    async fn test_port_sweep_marks_unpinged_hosts_alive() {
        let mut session = ScanSession::new(hosts(3), ports(&[443]), 2, Duration::ZERO);
        assert!(session.hosts().iter().all(|h| !h.is_alive()));

        let report = session.port_sweep(Arc::new(OpenPorts::new(&[])), PairingPolicy::IndexMatched).await;

        assert_eq!(report.merged, 3);
        assert!(session.hosts().iter().all(HostRecord::is_alive));
        assert!(session.hosts().iter().all(|h| h.active_ports().is_empty()));
    }

    #[tokio::test]
    async fn test_open_ports_match_double() {
        let open = [21, 25, 443, 993];
        let requested: Vec<u16> = (20..30).chain([443, 993, 995]).collect();
        let mut session = ScanSession::new(hosts(12), ports(&requested), 4, Duration::ZERO);

        session
            .port_sweep(Arc::new(OpenPorts::new(&open)), PairingPolicy::CrossProduct)
            .await;

        for host in session.hosts() {
            assert_eq!(numbers(&host.active_ports()), open.to_vec());
            assert_eq!(host.all_ports().len(), requested.len());
        }
    }

    #[tokio::test]
    async fn test_index_matched_sweep_probes_fewer_pairs() {
        let prober = Arc::new(OpenPorts::new(&[]));
        let mut session = ScanSession::new(hosts(10), ports(&(1..=10).collect::<Vec<u16>>()), 3, Duration::ZERO);

        session.port_sweep(Arc::clone(&prober), PairingPolicy::IndexMatched).await;

        assert_eq!(prober.probes.load(Ordering::SeqCst), 34);
        let probed: usize = session.hosts().iter().map(|h| h.port_results().len()).sum();
        assert_eq!(probed, 34);
    }

    #[tokio::test]
    async fn test_split_ports_counts_each_host_once() {
        let mut session = ScanSession::new(hosts(2), ports(&(1..=10).collect::<Vec<u16>>()), 4, Duration::ZERO);
        let prober = Arc::new(OpenPorts::new(&[3]));

        let report = session.port_sweep(Arc::clone(&prober), PairingPolicy::default()).await;

        assert!(report.is_complete());
        assert_eq!(report.merged, 2);
        let snap = session.monitor().snapshot();
        assert_eq!(snap.hosts_completed, 2);
        assert_eq!(snap.ports_completed, 20);
        assert_eq!(prober.probes.load(Ordering::SeqCst), 20);
        for host in session.hosts() {
            assert_eq!(host.port_results().len(), 10);
            assert_eq!(numbers(&host.active_ports()), vec![3]);
        }
    }

    #[tokio::test]
    async fn test_rescan_replaces_port_state() {
        let mut session = ScanSession::new(hosts(1), ports(&[80, 443]), 1, Duration::ZERO);
        session.port_sweep(Arc::new(OpenPorts::new(&[80])), PairingPolicy::default()).await;
        session.port_sweep(Arc::new(OpenPorts::new(&[443])), PairingPolicy::default()).await;

        let host = &session.hosts()[0];
        assert_eq!(host.port_results().len(), 2);
        assert_eq!(numbers(&host.active_ports()), vec![443]);
    }

    #[tokio::test]
    async fn test_cancel_returns_strict_subset() {
        let requested = ports(&[1, 2, 3, 4, 5]);
        let mut session = ScanSession::new(hosts(4), requested.clone(), 1, Duration::ZERO);
        let prober = Arc::new(CancelAfter {
            monitor: Arc::clone(session.monitor()),
            limit: 7,
            probes: AtomicUsize::new(0),
        });

        let report = session.port_sweep(Arc::clone(&prober), PairingPolicy::default()).await;

        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert_eq!(prober.probes.load(Ordering::SeqCst), 7);

        let mut seen = HashSet::new();
        for host in session.hosts() {
            for result in host.port_results() {
                assert!(requested.contains(&result.port));
                assert!(seen.insert((host.address(), result.port)));
            }
        }
        assert_eq!(seen.len(), 7);
        assert!(seen.len() < 4 * requested.len());
    }

    #[tokio::test]
    async fn test_failed_partition_keeps_other_results() {
        let targets = hosts(4);
        let mut session = ScanSession::new(targets.clone(), ports(&[80, 443]), 2, Duration::ZERO);

        // Round-robin buckets: {h1, h3} and {h2, h4}.
        let report = session
            .port_sweep(Arc::new(FailsFor(targets[1])), PairingPolicy::default())
            .await;

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], ScanError::SocketCreation { .. }));
        assert!(!report.cancelled);
        assert_eq!(report.merged, 2);
        assert_eq!(session.host(targets[0]).unwrap().active_ports().len(), 2);
        assert_eq!(session.host(targets[2]).unwrap().active_ports().len(), 2);
        assert!(session.host(targets[1]).unwrap().port_results().is_empty());
        assert!(session.host(targets[3]).unwrap().port_results().is_empty());
    }
}

//! Ping sweep worker.
//!
//! One worker walks its host group in order, echoing each host up to the
//! configured number of attempts and resolving the MAC address of hosts
//! that answered. Progress goes to the shared monitor after every host.

use pnet::datalink::MacAddr;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::monitor::ScanMonitor;
use crate::scanner::traits::{EchoProber, EchoReply};

/// Echo attempts per host before giving up.
pub const DEFAULT_PING_ATTEMPTS: u32 = 3;
/// Wait for each echo reply.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(256);
/// Bytes of random payload carried by each echo request.
pub const DEFAULT_PAYLOAD_SIZE: usize = 64;

/// Tunables for a ping sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOptions {
    pub timeout: Duration,
    pub attempts: u32,
    pub payload_size: usize,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PING_TIMEOUT,
            attempts: DEFAULT_PING_ATTEMPTS,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// Liveness of one pinged host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    pub address: Ipv4Addr,
    pub alive: bool,
    pub mac: Option<MacAddr>,
}

/// Random alphanumeric payload for one echo request.
pub fn random_payload(size: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .collect()
}

/// Ping every host in `hosts`, stopping early when the monitor is disabled.
///
/// Hosts skipped or interrupted by cancellation have no outcome.
pub async fn ping_worker<P>(
    prober: Arc<P>,
    hosts: Vec<Ipv4Addr>,
    options: PingOptions,
    monitor: Arc<ScanMonitor>,
) -> Vec<PingOutcome>
where
    P: EchoProber + ?Sized,
{
    let token = monitor.cancellation();
    let delay = monitor.delay();
    let mut outcomes = Vec::with_capacity(hosts.len());

    for address in hosts {
        if !monitor.is_enabled() {
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = ping_host(prober.as_ref(), address, &options) => outcome,
        };
        outcomes.push(outcome);
        monitor.record_host();

        if !pause(delay, &token).await {
            break;
        }
    }
    outcomes
}

/// Echo one host, retrying transient failures.
pub async fn ping_host<P>(prober: &P, address: Ipv4Addr, options: &PingOptions) -> PingOutcome
where
    P: EchoProber + ?Sized,
{
    let dead = PingOutcome {
        address,
        alive: false,
        mac: None,
    };

    for attempt in 1..=options.attempts.max(1) {
        let payload = random_payload(options.payload_size);
        match prober.echo(address, &payload, options.timeout).await {
            Ok(EchoReply::Success) => {
                let mac = match prober.resolve_mac(address).await {
                    Ok(mac) => mac,
                    Err(e) => {
                        debug!(%address, error = %e, "MAC lookup failed");
                        None
                    }
                };
                debug!(%address, attempt, "host alive");
                return PingOutcome {
                    address,
                    alive: true,
                    mac,
                };
            }
            Ok(EchoReply::HostUnreachable) => {
                debug!(%address, "destination host unreachable");
                return dead;
            }
            Ok(EchoReply::Other(status)) => {
                warn!(%address, %status, "unexpected echo status");
                return dead;
            }
            Err(ScanError::ProbeTransient { reason, .. }) => {
                debug!(%address, attempt, %reason, "echo attempt failed");
            }
            Err(e) => {
                warn!(%address, error = %e, "echo failed");
                return dead;
            }
        }
    }
    dead
}

/// Sleep for the inter-host delay. Returns false if cancelled meanwhile.
pub(crate) async fn pause(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies from a script keyed by host; unscripted hosts time out.
    #[derive(Default)]
    struct ScriptedEcho {
        replies: Mutex<HashMap<Ipv4Addr, Vec<ScanResult<EchoReply>>>>,
        calls: Mutex<HashMap<Ipv4Addr, usize>>,
        payload_sizes: Mutex<Vec<usize>>,
        mac: Option<MacAddr>,
    }

    impl ScriptedEcho {
        fn script(self, host: Ipv4Addr, replies: Vec<ScanResult<EchoReply>>) -> Self {
            self.replies.lock().unwrap().insert(host, replies);
            self
        }

        fn calls(&self, host: Ipv4Addr) -> usize {
            self.calls.lock().unwrap().get(&host).copied().unwrap_or(0)
        }
    }

    fn timeout(target: Ipv4Addr) -> ScanResult<EchoReply> {
        Err(ScanError::ProbeTransient {
            target,
            reason: "timed out".into(),
        })
    }

    #[async_trait]
    impl EchoProber for ScriptedEcho {
        async fn echo(&self, target: Ipv4Addr, payload: &[u8], _timeout: Duration) -> ScanResult<EchoReply> {
            self.payload_sizes.lock().unwrap().push(payload.len());
            *self.calls.lock().unwrap().entry(target).or_default() += 1;
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&target) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => timeout(target),
            }
        }

        async fn resolve_mac(&self, _target: Ipv4Addr) -> ScanResult<Option<MacAddr>> {
            Ok(self.mac)
        }
    }

    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 7);

    #[test]
    fn test_random_payload_is_alphanumeric() {
        let payload = random_payload(DEFAULT_PAYLOAD_SIZE);
        assert_eq!(payload.len(), 64);
        assert!(payload.iter().all(u8::is_ascii_alphanumeric));
    }

    #[tokio::test]
    async fn test_success_after_retries_resolves_mac() {
        let mac = MacAddr::new(0, 1, 2, 3, 4, 5);
        let prober = ScriptedEcho {
            mac: Some(mac),
            ..Default::default()
        }
        .script(HOST, vec![timeout(HOST), Ok(EchoReply::Success)]);

        let outcome = ping_host(&prober, HOST, &PingOptions::default()).await;
        assert!(outcome.alive);
        assert_eq!(outcome.mac, Some(mac));
        assert_eq!(prober.calls(HOST), 2);
        assert!(prober.payload_sizes.lock().unwrap().iter().all(|&n| n == 64));
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_limit() {
        let prober = ScriptedEcho::default();
        let outcome = ping_host(&prober, HOST, &PingOptions::default()).await;
        assert!(!outcome.alive);
        assert_eq!(prober.calls(HOST), 3);
    }

    #[tokio::test]
    async fn test_unreachable_is_not_retried() {
        let prober = ScriptedEcho::default().script(HOST, vec![Ok(EchoReply::HostUnreachable)]);
        let outcome = ping_host(&prober, HOST, &PingOptions::default()).await;
        assert!(!outcome.alive);
        assert_eq!(prober.calls(HOST), 1);

        let prober = ScriptedEcho::default().script(HOST, vec![Ok(EchoReply::Other("bad checksum".into()))]);
        assert!(!ping_host(&prober, HOST, &PingOptions::default()).await.alive);
        assert_eq!(prober.calls(HOST), 1);
    }

    #[tokio::test]
    async fn test_worker_records_every_host() {
        let hosts: Vec<Ipv4Addr> = (1..=5).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
        let prober = Arc::new(
            ScriptedEcho::default()
                .script(hosts[1], vec![Ok(EchoReply::Success)])
                .script(hosts[3], vec![Ok(EchoReply::Success)]),
        );
        let monitor = Arc::new(ScanMonitor::default());
        let options = PingOptions {
            attempts: 1,
            ..Default::default()
        };

        let outcomes = ping_worker(prober, hosts.clone(), options, Arc::clone(&monitor)).await;

        assert_eq!(outcomes.len(), 5);
        let alive: Vec<Ipv4Addr> = outcomes.iter().filter(|o| o.alive).map(|o| o.address).collect();
        assert_eq!(alive, vec![hosts[1], hosts[3]]);
        assert_eq!(monitor.snapshot().hosts_completed, 5);
    }

    #[tokio::test]
    async fn test_worker_stops_when_disabled() {
        let hosts: Vec<Ipv4Addr> = (1..=5).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
        let monitor = Arc::new(ScanMonitor::default());
        monitor.cancel();

        let outcomes = ping_worker(Arc::new(ScriptedEcho::default()), hosts, PingOptions::default(), Arc::clone(&monitor)).await;
        assert!(outcomes.is_empty());
        assert_eq!(monitor.snapshot().hosts_completed, 0);
    }

    #[tokio::test]
    async fn test_pause_is_interrupted_by_cancel() {
        let token = CancellationToken::new();
        assert!(pause(Duration::ZERO, &token).await);
        token.cancel();
        assert!(!pause(Duration::from_secs(30), &token).await);
    }
}

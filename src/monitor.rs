//! Shared progress and cancellation state for a sweep.
//!
//! The snapshot is guarded by a mutex, so counter increments are
//! read-modify-write under the lock and never lose updates. A
//! [`CancellationToken`] mirrors the `enabled` flag so in-flight probes can be
//! interrupted, not only future ones skipped.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of sweep progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSnapshot {
    /// Hosts fully processed. A host split across workers counts once.
    pub hosts_completed: usize,
    /// Ports attempted, counted per finished host batch.
    pub ports_completed: usize,
    /// Cleared to request that workers stop.
    pub enabled: bool,
    /// Pause between hosts.
    pub delay: Duration,
}

impl MonitorSnapshot {
    fn fresh(delay: Duration) -> Self {
        Self {
            hosts_completed: 0,
            ports_completed: 0,
            enabled: true,
            delay,
        }
    }
}

struct Inner {
    snapshot: MonitorSnapshot,
    token: CancellationToken,
    /// Work shares still outstanding per host when a host is split across
    /// several workers.
    pending_shares: HashMap<Ipv4Addr, usize>,
}

/// Progress counters and the cooperative stop flag shared by workers and
/// the interactive controller.
pub struct ScanMonitor {
    inner: Mutex<Inner>,
}

impl ScanMonitor {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: MonitorSnapshot::fresh(delay),
                token: CancellationToken::new(),
                pending_shares: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.lock().snapshot
    }

    /// Overwrite the whole state. Clearing `enabled` cancels in-flight probes;
    /// setting it again arms a fresh token.
    pub fn replace(&self, snapshot: MonitorSnapshot) {
        let mut inner = self.lock();
        if !snapshot.enabled {
            inner.token.cancel();
        } else if inner.token.is_cancelled() {
            inner.token = CancellationToken::new();
        }
        inner.snapshot = snapshot;
    }

    /// Reset counters and re-enable workers for a new sweep.
    pub fn begin_sweep(&self) {
        let delay = self.snapshot().delay;
        self.replace(MonitorSnapshot::fresh(delay));
        self.lock().pending_shares.clear();
    }

    /// Declare how many workers each host is split across. A host then
    /// counts as completed once all of its shares have reported.
    pub fn expect_shares(&self, shares: HashMap<Ipv4Addr, usize>) {
        self.lock().pending_shares = shares;
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().snapshot.enabled
    }

    pub fn delay(&self) -> Duration {
        self.lock().snapshot.delay
    }

    /// Ask every worker to stop.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.snapshot.enabled = false;
        inner.token.cancel();
    }

    /// Token that fires when the current sweep is cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.lock().token.clone()
    }

    pub fn record_host(&self) {
        self.lock().snapshot.hosts_completed += 1;
    }

    /// One worker finished its share of `address`.
    pub fn record_host_share(&self, address: Ipv4Addr) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let done = match inner.pending_shares.get_mut(&address) {
            Some(left) => {
                *left = left.saturating_sub(1);
                *left == 0
            }
            None => true,
        };
        if done {
            inner.pending_shares.remove(&address);
            inner.snapshot.hosts_completed += 1;
        }
    }

    pub fn record_ports(&self, count: usize) {
        self.lock().snapshot.ports_completed += count;
    }
}

impl Default for ScanMonitor {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cancel_fires_token() {
        let monitor = ScanMonitor::new(Duration::from_millis(30));
        let token = monitor.cancellation();
        assert!(monitor.is_enabled());

        monitor.cancel();
        assert!(!monitor.is_enabled());
        assert!(token.is_cancelled());
        assert_eq!(monitor.delay(), Duration::from_millis(30));
    }

    #[test]
    fn test_begin_sweep_rearms() {
        let monitor = ScanMonitor::default();
        monitor.record_host();
        monitor.record_ports(5);
        monitor.cancel();

        monitor.begin_sweep();
        let snap = monitor.snapshot();
        assert!(snap.enabled);
        assert_eq!(snap.hosts_completed, 0);
        assert_eq!(snap.ports_completed, 0);
        assert!(!monitor.cancellation().is_cancelled());
    }

    #[test]
    fn test_replace_disabled_cancels() {
        let monitor = ScanMonitor::default();
        let token = monitor.cancellation();
        let mut snap = monitor.snapshot();
        snap.enabled = false;
        monitor.replace(snap);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_split_host_completes_once() {
        let monitor = ScanMonitor::default();
        let split = Ipv4Addr::new(10, 0, 0, 1);
        let whole = Ipv4Addr::new(10, 0, 0, 2);
        monitor.expect_shares(HashMap::from([(split, 3)]));

        monitor.record_host_share(split);
        monitor.record_host_share(split);
        assert_eq!(monitor.snapshot().hosts_completed, 0);
        monitor.record_host_share(split);
        assert_eq!(monitor.snapshot().hosts_completed, 1);

        monitor.record_host_share(whole);
        assert_eq!(monitor.snapshot().hosts_completed, 2);

        monitor.begin_sweep();
        monitor.record_host_share(split);
        assert_eq!(monitor.snapshot().hosts_completed, 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let monitor = Arc::new(ScanMonitor::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        monitor.record_host();
                        monitor.record_ports(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = monitor.snapshot();
        assert_eq!(snap.hosts_completed, 8000);
        assert_eq!(snap.ports_completed, 16000);
    }
}

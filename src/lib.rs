//! # netsweep - IPv4 ping sweep and TCP connect scanner
//!
//! netsweep expands target specifications (addresses, CIDR blocks,
//! hostnames) into a host list, finds live hosts with ICMP echo, then
//! connect-scans a set of TCP ports across them with a pool of worker tasks.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use netsweep::scanner::{PairingPolicy, ScanSession, TcpConnectProber};
//! use netsweep::types::{Port, TargetSpec};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hosts = TargetSpec::parse("192.168.1.0/28").unwrap().expand().await;
//!     let ports = vec![Port::new(22).unwrap(), Port::new(80).unwrap()];
//!     let mut session = ScanSession::new(hosts, ports, 4, Duration::ZERO);
//!
//!     let prober = Arc::new(TcpConnectProber::new(Duration::from_secs(1)));
//!     session.port_sweep(prober, PairingPolicy::CrossProduct).await;
//!
//!     for host in session.hosts() {
//!         for result in host.active_ports() {
//!             println!("{}:{} open", host.address(), result.port);
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - validated ports and target specifications
//! - [`scanner`] - scan session, sweep workers, work partitioning and probers
//! - [`monitor`] - shared progress counters and cancellation
//! - [`controller`] - keyboard control of a running sweep
//! - [`model`] - host records and port results
//! - [`services`] - port to service-name lookup
//! - [`config`] - settings file and validation
//! - [`output`] - plain, JSON and CSV rendering
//! - [`error`] - error types

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod monitor;
pub mod output;
pub mod scanner;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ConfigError, ScanError};
pub use model::{HostRecord, PortProbeResult};
pub use monitor::{MonitorSnapshot, ScanMonitor};
pub use scanner::{PairingPolicy, ScanSession, SweepReport};
pub use types::{Port, PortSpec, TargetSpec};

//! Error types for netsweep.
//!
//! Uses `thiserror` for ergonomic error definitions. Per-probe failures never
//! show up here: they are folded into port and host results. What remains are
//! the structural failures that abort a worker partition or the whole run.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{PortError, TargetError};

/// Errors raised while probing hosts.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("resolution failed for {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("failed to create socket for {target}: {source}")]
    SocketCreation {
        target: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("network subsystem initialisation failed: {0}")]
    SubsystemInit(String),

    #[error("probe to {target} failed: {reason}")]
    ProbeTransient { target: Ipv4Addr, reason: String },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Whether this error must end the whole session rather than one partition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SubsystemInit(_))
    }
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors raised while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings file: {0}")]
    InvalidFormat(String),

    #[error("{field} value {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        expected: &'static str,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level error for the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_subsystem_init_is_fatal() {
        assert!(ScanError::SubsystemInit("no icmp socket".into()).is_fatal());
        assert!(!ScanError::ProbeTransient {
            target: Ipv4Addr::LOCALHOST,
            reason: "timeout".into(),
        }
        .is_fatal());
        assert!(!ScanError::Worker("panicked".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::OutOfRange {
            field: "threads",
            value: 0,
            expected: "1-1024",
        };
        assert_eq!(err.to_string(), "threads value 0 is out of range (1-1024)");
    }
}

//! Scan settings and where they live on disk.
//!
//! Settings come from a JSON file in the platform config directory
//! (`~/.config/netsweep/settings.json` on Linux). Missing fields take their
//! defaults; command-line flags are applied on top by the caller.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::ping::{DEFAULT_PAYLOAD_SIZE, DEFAULT_PING_ATTEMPTS, DEFAULT_PING_TIMEOUT};
use crate::scanner::{PairingPolicy, PingOptions};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 1024;
/// Smallest non-zero inter-host delay.
pub const MIN_DELAY_MS: u64 = 30;
pub const MAX_DELAY_MS: u64 = 50_000;

const SETTINGS_FILE: &str = "settings.json";

/// Application directory paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/netsweep)
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("", "", "netsweep").ok_or(ConfigError::DirectoryNotFound)?;
        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }
}

/// Tunables for a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker tasks per sweep.
    pub threads: usize,
    /// Pause after each host, in milliseconds. 0 disables it.
    pub delay_ms: u64,
    pub ping_timeout_ms: u64,
    pub ping_attempts: u32,
    pub ping_payload_size: usize,
    /// Upper bound on one TCP connect attempt.
    pub connect_timeout_ms: u64,
    pub pairing: PairingPolicy,
    /// Listen for `q`/`s` keypresses during sweeps.
    pub interactive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_THREADS)
            .clamp(MIN_THREADS, MAX_THREADS);

        Self {
            threads,
            delay_ms: 0,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT.as_millis() as u64,
            ping_attempts: DEFAULT_PING_ATTEMPTS,
            ping_payload_size: DEFAULT_PAYLOAD_SIZE,
            connect_timeout_ms: 1000,
            pairing: PairingPolicy::default(),
            interactive: true,
        }
    }
}

impl Settings {
    /// Load settings from the default location, or defaults if there is no
    /// settings file yet or no home directory to look in.
    pub fn load() -> ConfigResult<Self> {
        let file = match Paths::new() {
            Ok(paths) => paths.settings_file(),
            Err(ConfigError::DirectoryNotFound) => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        if !file.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let write_failed = |e: std::io::Error| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_failed)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(MIN_THREADS..=MAX_THREADS).contains(&self.threads) {
            return Err(ConfigError::OutOfRange {
                field: "threads",
                value: self.threads as u64,
                expected: "1-1024",
            });
        }
        if self.delay_ms != 0 && !(MIN_DELAY_MS..=MAX_DELAY_MS).contains(&self.delay_ms) {
            return Err(ConfigError::OutOfRange {
                field: "delay_ms",
                value: self.delay_ms,
                expected: "0 or 30-50000",
            });
        }
        if self.ping_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "ping_attempts",
                value: 0,
                expected: "at least 1",
            });
        }
        if self.ping_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "ping_timeout_ms",
                value: 0,
                expected: "at least 1",
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "connect_timeout_ms",
                value: 0,
                expected: "at least 1",
            });
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_options(&self) -> PingOptions {
        PingOptions {
            timeout: Duration::from_millis(self.ping_timeout_ms),
            attempts: self.ping_attempts,
            payload_size: self.ping_payload_size,
        }
    }
}

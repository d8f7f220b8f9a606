//! Command-line interface for netsweep.
//!
//! Uses `clap` derive macros for declarative argument parsing. Flags given
//! on the command line override the settings file.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Paths, Settings};
use crate::error::{CliError, CliResult};
use crate::output::{self, PortView, SPLITTER};
use crate::scanner::{
    ControllerMode, NetworkSubsystem, PairingPolicy, ScanSession, SweepReport, TcpConnectProber,
};
use crate::services::ServiceMap;
use crate::types::{Port, PortError, PortSpec, TargetSpec};

/// Ports below this are scanned when no port list is given, if the bundled
/// service list names them.
pub const DEFAULT_PORT_CEILING: u16 = 3500;

/// Ping sweep and TCP connect scanner for IPv4 hosts and networks.
#[derive(Parser, Debug)]
#[command(name = "netsweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ping sweep and TCP connect scanner", long_about = None)]
pub struct Args {
    /// Target to scan: IPv4 address, CIDR block or hostname (repeatable)
    ///
    /// Examples:
    ///   192.168.1.1        Single IP address
    ///   example.com        Hostname
    ///   192.168.1.0/24     CIDR range (blocks larger than a /8 are refused)
    #[arg(short, long = "target", value_name = "TARGET", required = true)]
    pub targets: Vec<String>,

    /// Ports to scan (e.g., "80", "22,80,443", "1-1024") [default: known services below 3500]
    #[arg(short, long)]
    pub ports: Option<PortSpec>,

    /// Worker tasks per sweep (1-1024) [default: available cores]
    #[arg(short = 'n', long = "net-threads", value_name = "THREADS")]
    pub threads: Option<usize>,

    /// Delay after each host in milliseconds (0 or 30-50000)
    #[arg(short, long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Skip the ping sweep and go straight to the port scan
    #[arg(short, long = "fast-mode")]
    pub fast: bool,

    /// Verbose output: list closed ports too, and log progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format for results
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
    pub output: OutputFormat,

    /// How ports are paired with hosts when both are split across workers
    #[arg(long, value_enum)]
    pub pairing: Option<PairingPolicy>,

    /// Do not read q/s keypresses during sweeps
    #[arg(long)]
    pub no_interactive: bool,

    /// Path to a settings file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save_config: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl Args {
    /// Settings file values with command-line overrides applied, validated.
    pub fn settings(&self) -> CliResult<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load()?,
        };
        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }
        if let Some(delay) = self.delay {
            settings.delay_ms = delay;
        }
        if let Some(pairing) = self.pairing {
            settings.pairing = pairing;
        }
        if self.no_interactive {
            settings.interactive = false;
        }
    }

    /// Requested ports, or the bundled default list.
    pub fn port_list(&self, services: &ServiceMap) -> CliResult<Vec<Port>> {
        let ports = match &self.ports {
            Some(spec) => spec.ports().to_vec(),
            None => services.ports_below(DEFAULT_PORT_CEILING),
        };
        if ports.is_empty() {
            return Err(PortError::Empty.into());
        }
        Ok(ports)
    }

    fn is_plain(&self) -> bool {
        self.output == OutputFormat::Plain
    }

    fn say(&self, line: &str) {
        if self.is_plain() {
            println!("{line}");
        }
    }

    /// Run the scan described by these arguments.
    ///
    /// Results are printed even when a sweep lost worker partitions; the
    /// failures are then returned as an error.
    pub async fn execute(&self) -> CliResult<()> {
        let settings = self.settings()?;
        if self.save_config {
            let path = match &self.config {
                Some(path) => path.clone(),
                None => Paths::new()?.settings_file(),
            };
            settings.save_to(&path)?;
            if self.is_plain() {
                output::print_info(&format!("Settings saved to {}", path.display()));
            }
        }

        let services = ServiceMap::bundled();
        let ports = self.port_list(&services)?;
        let addresses = expand_targets(&self.targets).await?;
        if addresses.is_empty() {
            self.say("Failed to resolve any valid hosts from provided targets");
            return Ok(());
        }

        if self.verbose {
            self.say("Started in verbose mode");
        }
        if self.fast {
            self.say("Running in fast mode, skipping ping sweep");
        }
        if self.verbose {
            self.say(&format!("Running with {} threads", settings.threads));
            self.say(&format!("Using a {}ms delay", settings.delay_ms));
        }

        let controller = if settings.interactive && self.is_plain() && console::user_attended() {
            ControllerMode::Terminal
        } else {
            ControllerMode::Disabled
        };
        let progress = controller == ControllerMode::Disabled
            && self.is_plain()
            && console::user_attended_stderr();

        let mut session = ScanSession::new(addresses, ports, settings.threads, settings.delay())
            .with_controller(controller)
            .with_progress(progress);
        self.say(&format!("Targeting: {} hosts", session.hosts().len()));
        self.say(&format!("Targeting: {} ports", session.ports().len()));
        info!(
            hosts = session.hosts().len(),
            ports = session.ports().len(),
            threads = settings.threads,
            delay_ms = settings.delay_ms,
            "session ready"
        );

        let mut failures = Vec::new();

        if !self.fast {
            self.say(SPLITTER);
            self.say("Starting ping sweep");
            let subsystem = Arc::new(NetworkSubsystem::init()?);
            let report = session.ping_sweep(subsystem, settings.ping_options()).await;
            self.say(&format!("Pinged {} hosts in {}", report.hosts, elapsed(&report)));
            failures.extend(report.failures);
        }

        self.say("Running TCP scan");
        self.say(SPLITTER);
        let prober = Arc::new(TcpConnectProber::new(settings.connect_timeout()));
        let report = session.port_sweep(prober, settings.pairing).await;
        self.say(&format!("Scanned {} hosts in {}", report.hosts, elapsed(&report)));
        failures.extend(report.failures);

        let view = PortView::choose(self.verbose, session.ports().len());
        output::print_results(session.hosts(), &services, view, self.output)?;

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0).into()),
            n => Err(CliError::Other(format!(
                "{n} worker partitions failed, results are partial (first: {})",
                failures[0]
            ))),
        }
    }
}

/// Expand every target, dropping duplicates and keeping first-seen order.
pub async fn expand_targets(targets: &[String]) -> CliResult<Vec<Ipv4Addr>> {
    let mut addresses = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for target in targets {
        let spec = TargetSpec::parse(target)?;
        for address in spec.expand().await {
            if seen.insert(address) {
                addresses.push(address);
            }
        }
    }
    Ok(addresses)
}

fn elapsed(report: &SweepReport) -> String {
    let mut text = format_duration(report.elapsed);
    if report.cancelled {
        text.push_str(" (stopped early)");
    }
    text
}

fn format_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

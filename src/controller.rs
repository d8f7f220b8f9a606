//! Interactive controller: watches the keyboard while a sweep runs.
//!
//! `q` cancels the sweep, `s` prints a status line, any other key prints the
//! hint again. The loop ends as soon as the monitor is disabled, whether by
//! the operator or because the sweep finished.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::monitor::ScanMonitor;

/// How long a single keyboard poll may block.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const HINT: &str = "Press q to exit, s for status";

static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// Source of single keypresses.
pub trait KeySource: Send {
    /// Wait up to `timeout` for a key.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>>;
}

/// Keypresses from the controlling terminal, read in raw mode.
pub struct TerminalKeys {
    _raw: RawModeGuard,
}

impl TerminalKeys {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            _raw: RawModeGuard::enable()?,
        })
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                // Raw mode swallows SIGINT, so treat Ctrl+C as quit.
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Ok(Some('q')),
                KeyCode::Char(c) => Ok(Some(c)),
                _ => Ok(Some('\0')),
            },
            _ => Ok(None),
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        RAW_MODE.store(true, Ordering::SeqCst);
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        RAW_MODE.store(false, Ordering::SeqCst);
        let _ = disable_raw_mode();
    }
}

/// Stderr log writer that keeps lines aligned while the controller holds the
/// terminal in raw mode, where a bare `\n` does not return the carriage.
///
/// Pass `LogWriter::default` to `tracing_subscriber`'s `with_writer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWriter;

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        if RAW_MODE.load(Ordering::SeqCst) {
            write_crlf(&mut stderr, buf)?;
        } else {
            stderr.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn write_crlf<W: Write>(out: &mut W, buf: &[u8]) -> io::Result<()> {
    for (i, line) in buf.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.write_all(b"\r\n")?;
        }
        out.write_all(line.strip_suffix(b"\r").unwrap_or(line))?;
    }
    Ok(())
}

/// Run the controller loop until the monitor is disabled.
///
/// Lines end in `\r\n` because the terminal is in raw mode.
pub fn run<K, W>(monitor: &ScanMonitor, keys: &mut K, out: &mut W) -> io::Result<()>
where
    K: KeySource + ?Sized,
    W: Write,
{
    write!(out, "{HINT}\r\n")?;
    out.flush()?;

    while monitor.is_enabled() {
        match keys.next_key(POLL_INTERVAL)? {
            Some('q') => {
                write!(out, "Quitting Early!\r\n")?;
                out.flush()?;
                monitor.cancel();
                return Ok(());
            }
            Some('s') => {
                let snap = monitor.snapshot();
                write!(
                    out,
                    "Completed: {} Hosts, {} Ports\r\n",
                    snap.hosts_completed, snap.ports_completed
                )?;
                out.flush()?;
            }
            Some(_) => {
                write!(out, "{HINT}\r\n")?;
                out.flush()?;
            }
            None => {}
        }
    }
    Ok(())
}

/// Spawn the controller on a blocking thread, reading the real terminal.
pub fn spawn(monitor: Arc<ScanMonitor>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut keys = match TerminalKeys::new() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "keyboard input unavailable, controller disabled");
                return;
            }
        };
        let stdout = io::stdout();
        if let Err(e) = run(&monitor, &mut keys, &mut stdout.lock()) {
            debug!(error = %e, "controller stopped");
        }
    })
}

//! Configuration management for netsweep.
//!
//! Provides XDG-compliant settings storage and range validation.

mod settings;

pub use settings::{Paths, Settings, MAX_DELAY_MS, MAX_THREADS, MIN_DELAY_MS, MIN_THREADS};

//! Core input types: validated ports and target specifications.

mod port;
mod target;

pub use port::{Port, PortError, PortSpec};
pub use target::{expand_cidr, TargetError, TargetSpec};

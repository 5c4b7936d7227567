//! Telemetry report construction.
//!
//! [`ReportComposer`] turns a packet event plus the d/q/f decision into a
//! [`ReportRecord`]; a [`ReportFormat`] selected once per switch serializes
//! the record; [`wire`] adds the outer Ethernet/IPv4/UDP encapsulation.

mod composer;
mod format;
mod record;
pub mod wire;

pub use composer::{ReportBits, ReportComposer};
pub use format::{format_for, ReportFormat, V1Format, V2Format};
pub use record::{ReportKind, ReportRecord, INVALID_PORT};

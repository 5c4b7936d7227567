//! # dteld - DTEL Report Daemon
//!
//! Runs the `sonic-dtel` report engine over a stream of packet events and
//! sends the resulting telemetry reports to collectors over UDP.
//!
//! ## Responsibilities
//! - Load `/etc/sonic/dteld.toml` and install sessions, watch rules,
//!   queue reports, drop reason toggles and event settings
//! - Read newline-delimited JSON packet events from a file or stdin
//! - Fan events out to pipeline workers keyed by ingress port
//! - Run the flow state clear cycle
//! - Log engine statistics periodically and on shutdown

pub mod clear_cycle;
pub mod config_file;
pub mod daemon;
mod error;
pub mod sink;
pub mod source;
pub mod worker;

pub use clear_cycle::ClearCycle;
pub use config_file::{DteldConfig, DEFAULT_CONFIG_PATH};
pub use error::{DteldError, Result};
pub use sink::{DiscardSink, UdpReportSink};
pub use source::EventReader;
pub use worker::{WorkerPool, WorkerSummary};

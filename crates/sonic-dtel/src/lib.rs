//! # sonic-dtel - Dataplane Telemetry Report Engine
//!
//! Decides, for every forwarded or dropped packet, whether the switch
//! emits a telemetry report, builds the report and distributes it to the
//! configured collectors.
//!
//! ## Pipeline
//! - [`Watchlist`]: priority/most-specific match of the packet against
//!   watch rules, yielding a report-type mask
//! - [`DropReasonGate`]: per-drop-reason enable toggles
//! - [`FlowSuppressionCache`]: fixed-capacity sharded table that keeps
//!   one FLOW report per flow, path and latency bucket per epoch
//! - [`QueueBreachTracker`]: per-queue thresholds and breach quotas
//! - [`ReportComposer`] and [`ReportFormat`]: v1/v2 report headers
//! - [`Distributor`]: outer encapsulation, per-destination sequence
//!   numbers, load balancing and UDP source port entropy
//!
//! [`DtelEngine`] wires these together. The packet path is lock-light
//! (atomics, per-shard mutexes, `dashmap`) and never blocks on I/O:
//! transport is delegated to a non-blocking [`ReportSink`].

mod distributor;
mod drop_gate;
mod engine;
mod error;
mod event;
pub mod hash;
mod queue;
pub mod report;
mod session;
mod stats;
mod suppression;
mod types;
mod watchlist;

pub use distributor::{CaptureSink, CapturedReport, Distributor, EmitSummary, ReportSink};
pub use drop_gate::DropReasonGate;
pub use engine::{
    DtelEngine, EngineConfig, EventSettings, ProcessOutcome, DEFAULT_TCP_FLAG_MASK, MAX_DSCP,
};
pub use error::{DtelError, Result};
pub use event::{FlowKey, PacketEvent, IP_PROTOCOL_TCP};
pub use queue::{QueueBreachTracker, QueueEventGates, QueueReportConfig, QueueVerdict};
pub use report::{ReportBits, ReportComposer, ReportFormat, ReportKind, ReportRecord};
pub use session::{
    Destination, DistributionMode, ReportSession, ReportSessionConfig, SessionTable,
    UdpSrcPortMode, DEFAULT_REPORT_UDP_PORT,
};
pub use stats::DtelStats;
pub use suppression::{latency_bucket, CollisionPolicy, FlowSuppressionCache, SuppressionConfig};
pub use types::{
    BindPoint, Direction, DropReasonCode, DtelEventType, HeaderVersion, QueueKey, ReportTypeMask,
};
pub use watchlist::{Classification, L4PortMatch, MatchKey, WatchRule};

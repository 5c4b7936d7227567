//! The per-packet report pipeline.
//!
//! ```text
//! PacketEvent -> Watchlist -> DropReasonGate (drops)
//!             -> QueueBreachTracker / FlowSuppressionCache
//!             -> ReportComposer -> Distributor -> ReportSink
//! ```
//!
//! [`DtelEngine::process`] never fails. Anything that goes wrong on the
//! packet path results in no report and a counter bump.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, trace};

use crate::distributor::{Distributor, ReportSink};
use crate::drop_gate::DropReasonGate;
use crate::error::{DtelError, Result};
use crate::event::{PacketEvent, IP_PROTOCOL_TCP};
use crate::hash::path_digest;
use crate::queue::{QueueBreachTracker, QueueEventGates, QueueVerdict};
use crate::report::{format_for, ReportBits, ReportComposer};
use crate::session::{ReportSession, SessionTable};
use crate::stats::{DtelStats, StatsCounters};
use crate::suppression::{latency_bucket, FlowSuppressionCache, SuppressionConfig};
use crate::types::{DropReasonCode, DtelEventType, HeaderVersion, ReportTypeMask};
use crate::watchlist::{Classification, Watchlist};

/// TCP FIN, SYN and RST.
pub const DEFAULT_TCP_FLAG_MASK: u8 = 0x07;

/// Largest DSCP value.
pub const MAX_DSCP: u8 = 63;

const DSCP_UNSET: u8 = u8::MAX;

fn default_latency_sensitivity() -> u8 {
    10
}

fn default_tcp_flag_mask() -> u8 {
    DEFAULT_TCP_FLAG_MASK
}

fn default_true() -> bool {
    true
}

/// Switch-wide engine settings fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub switch_id: u32,
    #[serde(default)]
    pub hw_id: u8,
    #[serde(default)]
    pub header_version: HeaderVersion,
    /// Hop latency bucket width as a power of two nanoseconds.
    #[serde(default = "default_latency_sensitivity")]
    pub latency_sensitivity: u8,
    /// TCP flags that bypass flow suppression when `FlowTcpFlag` is on.
    #[serde(default = "default_tcp_flag_mask")]
    pub tcp_flag_mask: u8,
    #[serde(default)]
    pub suppression: SuppressionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            switch_id: 0,
            hw_id: 0,
            header_version: HeaderVersion::default(),
            latency_sensitivity: default_latency_sensitivity(),
            tcp_flag_mask: default_tcp_flag_mask(),
            suppression: SuppressionConfig::default(),
        }
    }
}

/// Enable flag and DSCP of one DTEL event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Outer DSCP of reports this event triggers; session ToS if unset.
    #[serde(default)]
    pub dscp: Option<u8>,
}

impl EventSettings {
    pub const fn enabled() -> Self {
        Self {
            enabled: true,
            dscp: None,
        }
    }

    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            dscp: None,
        }
    }

    pub const fn with_dscp(mut self, dscp: u8) -> Self {
        self.dscp = Some(dscp);
        self
    }

    /// Defaults an engine starts with: everything on except the TCP-flag
    /// suppression bypass.
    pub const fn default_for(event: DtelEventType) -> Self {
        match event {
            DtelEventType::FlowTcpFlag => Self::disabled(),
            _ => Self::enabled(),
        }
    }
}

#[derive(Debug)]
struct EventSlot {
    enabled: AtomicBool,
    dscp: AtomicU8,
}

impl EventSlot {
    fn new(settings: EventSettings) -> Self {
        Self {
            enabled: AtomicBool::new(settings.enabled),
            dscp: AtomicU8::new(settings.dscp.unwrap_or(DSCP_UNSET)),
        }
    }

    fn store(&self, settings: EventSettings) {
        self.dscp
            .store(settings.dscp.unwrap_or(DSCP_UNSET), Ordering::Release);
        self.enabled.store(settings.enabled, Ordering::Release);
    }

    fn load(&self) -> EventSettings {
        let dscp = self.dscp.load(Ordering::Acquire);
        EventSettings {
            enabled: self.enabled.load(Ordering::Acquire),
            dscp: (dscp != DSCP_UNSET).then_some(dscp),
        }
    }
}

/// What happened to one packet event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No watch rule and no monitored queue applied.
    NotWatched,
    /// Watched, but every report type was gated, suppressed or over quota.
    Filtered,
    /// A report was due but no session is active.
    NoSession,
    Reported {
        bits: ReportBits,
        sent: u32,
        failed: u32,
    },
}

impl ProcessOutcome {
    pub fn is_reported(&self) -> bool {
        matches!(self, ProcessOutcome::Reported { .. })
    }
}

/// DTEL report engine for one switch.
#[derive(Debug)]
pub struct DtelEngine {
    config: EngineConfig,
    watchlist: Watchlist,
    drop_gate: DropReasonGate,
    suppression: FlowSuppressionCache,
    queues: QueueBreachTracker,
    sessions: SessionTable,
    composer: ReportComposer,
    distributor: Distributor,
    events: [EventSlot; 6],
    latency_sensitivity: AtomicU8,
    tcp_flag_mask: AtomicU8,
    stats: StatsCounters,
}

impl DtelEngine {
    pub fn new(config: EngineConfig, sink: Arc<dyn ReportSink>) -> Self {
        let format = format_for(config.header_version);
        info!(
            switch_id = config.switch_id,
            version = ?config.header_version,
            suppression_slots = config.suppression.capacity,
            "Creating DTEL engine"
        );

        Self {
            watchlist: Watchlist::new(),
            drop_gate: DropReasonGate::new(),
            suppression: FlowSuppressionCache::new(config.suppression),
            queues: QueueBreachTracker::new(),
            sessions: SessionTable::new(),
            composer: ReportComposer::new(config.switch_id, config.hw_id, Arc::clone(&format)),
            distributor: Distributor::new(format, sink),
            events: DtelEventType::ALL.map(|e| EventSlot::new(EventSettings::default_for(e))),
            latency_sensitivity: AtomicU8::new(config.latency_sensitivity),
            tcp_flag_mask: AtomicU8::new(config.tcp_flag_mask),
            stats: StatsCounters::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn drop_gate(&self) -> &DropReasonGate {
        &self.drop_gate
    }

    pub fn suppression(&self) -> &FlowSuppressionCache {
        &self.suppression
    }

    pub fn queues(&self) -> &QueueBreachTracker {
        &self.queues
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn stats(&self) -> DtelStats {
        self.stats.snapshot()
    }

    pub fn event_settings(&self, event: DtelEventType) -> EventSettings {
        self.events[event.index()].load()
    }

    #[instrument(skip(self))]
    pub fn set_event(&self, event: DtelEventType, settings: EventSettings) -> Result<()> {
        if settings.dscp.is_some_and(|d| d > MAX_DSCP) {
            return Err(DtelError::InvalidEvent {
                event,
                reason: format!("dscp must be 0..={}", MAX_DSCP),
            });
        }
        self.events[event.index()].store(settings);
        info!("Set {} enabled={} dscp={:?}", event, settings.enabled, settings.dscp);
        Ok(())
    }

    pub fn latency_sensitivity(&self) -> u8 {
        self.latency_sensitivity.load(Ordering::Relaxed)
    }

    #[instrument(skip(self))]
    pub fn set_latency_sensitivity(&self, sensitivity: u8) {
        self.latency_sensitivity
            .store(sensitivity.min(63), Ordering::Relaxed);
    }

    pub fn tcp_flag_mask(&self) -> u8 {
        self.tcp_flag_mask.load(Ordering::Relaxed)
    }

    #[instrument(skip(self))]
    pub fn set_tcp_flag_mask(&self, mask: u8) {
        self.tcp_flag_mask.store(mask, Ordering::Relaxed);
    }

    /// One flow-state clear cycle. Returns the new epoch.
    pub fn advance_epoch(&self) -> u64 {
        self.suppression.advance_epoch()
    }

    fn enabled(&self, event: DtelEventType) -> bool {
        self.events[event.index()].enabled.load(Ordering::Acquire)
    }

    /// Runs one packet event through the pipeline.
    pub fn process(&self, event: &PacketEvent) -> ProcessOutcome {
        self.stats.event();

        let class = self.watchlist.classify(event);
        let queue_key = event.queue_key();
        let queue_monitored = queue_key.is_some_and(|k| self.queues.is_monitored(k));
        if class.report_types.is_empty() && !queue_monitored {
            self.stats.not_watched();
            return ProcessOutcome::NotWatched;
        }

        let Some(session) = self.sessions.active() else {
            self.stats.no_session();
            trace!("Report due but no active session");
            return ProcessOutcome::NoSession;
        };

        let drop = self.decide_drop(event, class);
        let queue = (class.requests(ReportTypeMask::QUEUE) || queue_monitored)
            && self.decide_queue(event);
        let flow = self.decide_flow(event, class, drop);

        let bits = ReportBits { drop, queue, flow };
        if !bits.any() {
            return ProcessOutcome::Filtered;
        }

        self.emit(event, bits, &session)
    }

    fn decide_drop(&self, event: &PacketEvent, class: Classification) -> bool {
        if !event.is_drop()
            || !class.requests(ReportTypeMask::DROP)
            || !self.enabled(DtelEventType::DropReport)
        {
            return false;
        }

        let reason = event.drop_reason.unwrap_or(DropReasonCode::UNKNOWN);
        let admitted = self.drop_gate.admit_drop(reason);
        if !admitted {
            self.stats.gated();
            trace!(%reason, "Drop report gated");
        }
        admitted
    }

    fn decide_queue(&self, event: &PacketEvent) -> bool {
        // A dropped packet only says something about its queue if the
        // queue itself dropped it.
        if event.is_drop() && !event.tail_drop {
            return false;
        }
        let Some(key) = event.queue_key() else {
            return false;
        };

        let gates = QueueEventGates {
            threshold_breach: self.enabled(DtelEventType::QueueReportThresholdBreach),
            tail_drop: self.enabled(DtelEventType::QueueReportTailDrop),
        };
        match self.queues.check_queue(
            key,
            event.hop_latency_ns(),
            event.queue_depth,
            event.tail_drop,
            gates,
        ) {
            QueueVerdict::Report => true,
            QueueVerdict::QuotaExhausted => {
                self.stats.over_quota();
                false
            }
            QueueVerdict::NotMonitored | QueueVerdict::NoBreach => false,
        }
    }

    fn decide_flow(&self, event: &PacketEvent, class: Classification, drop: bool) -> bool {
        if !class.requests(ReportTypeMask::FLOW) || !self.enabled(DtelEventType::FlowState) {
            return false;
        }
        // On a drop, FLOW only tags the drop report.
        if event.is_drop() {
            return drop;
        }

        let tcp_flagged = self.enabled(DtelEventType::FlowTcpFlag)
            && event.ip_protocol == IP_PROTOCOL_TCP
            && event.tcp_flags & self.tcp_flag_mask() != 0;
        let report_all = (class.report_all_packets
            && self.enabled(DtelEventType::FlowReportAllPackets))
            || tcp_flagged;

        let report = self.suppression.should_report(
            &event.flow_key(),
            path_digest(event.ingress_port, event.egress_port, event.queue_id),
            latency_bucket(event.hop_latency_ns(), self.latency_sensitivity()),
            report_all,
        );
        if !report {
            self.stats.suppressed();
        }
        report
    }

    /// Outer ToS: DSCP of the highest-priority triggering event, else the
    /// session's ToS.
    fn report_tos(&self, event: &PacketEvent, bits: ReportBits, session: &ReportSession) -> u8 {
        let trigger = if bits.drop {
            DtelEventType::DropReport
        } else if bits.queue && event.tail_drop {
            DtelEventType::QueueReportTailDrop
        } else if bits.queue {
            DtelEventType::QueueReportThresholdBreach
        } else {
            DtelEventType::FlowState
        };

        self.event_settings(trigger)
            .dscp
            .map_or(session.config().tos, |dscp| dscp << 2)
    }

    fn emit(&self, event: &PacketEvent, bits: ReportBits, session: &ReportSession) -> ProcessOutcome {
        let truncate_size = usize::from(session.config().truncate_size);
        let Some(record) = self.composer.compose(event, bits, truncate_size) else {
            return ProcessOutcome::Filtered;
        };
        if record.is_truncated() {
            self.stats.truncated();
        }

        let kind = record.kind;
        let tos = self.report_tos(event, bits, session);
        let summary = self.distributor.emit(record, session, tos);
        self.stats.sent(kind, summary.sent);
        self.stats.failed(summary.failed);

        trace!(?bits, sent = summary.sent, "Report emitted");
        ProcessOutcome::Reported {
            bits,
            sent: summary.sent,
            failed: summary.failed,
        }
    }
}

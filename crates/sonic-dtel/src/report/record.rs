//! Per-emission report record.

use crate::event::FlowKey;
use crate::types::DropReasonCode;

/// Port value carried when the packet has no egress port.
pub const INVALID_PORT: u16 = 0xffff;

/// Report variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Forwarded packet (flow and/or queue report).
    Postcard,
    /// Drop report (mirror on drop).
    Mod,
    /// Packet dropped by a full queue, reported by the queue's tail-drop
    /// monitor rather than the watchlist.
    TailDrop,
}

impl ReportKind {
    pub fn carries_drop_reason(self) -> bool {
        !matches!(self, ReportKind::Postcard)
    }
}

/// Everything a report header needs, built once per reported packet and
/// stamped with a per-destination sequence number at emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub kind: ReportKind,
    pub d_bit: bool,
    pub q_bit: bool,
    pub f_bit: bool,
    pub switch_id: u32,
    pub hw_id: u8,
    pub ingress_port: u16,
    pub egress_port: u16,
    pub queue_id: u8,
    pub queue_depth: u32,
    pub hop_latency_ns: u32,
    pub ingress_timestamp_ns: u64,
    pub egress_timestamp_ns: u64,
    pub drop_reason: DropReasonCode,
    /// Captured inner packet after truncation.
    pub inner_packet: Vec<u8>,
    /// Inner packet length before truncation.
    pub original_length: usize,
    pub sequence_number: u32,
    /// Flow the report describes; drives source-port entropy and collector
    /// selection.
    pub flow: FlowKey,
}

impl ReportRecord {
    pub fn truncated_bytes(&self) -> usize {
        self.original_length.saturating_sub(self.inner_packet.len())
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated_bytes() > 0
    }
}

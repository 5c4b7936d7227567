//! Report composer.

use std::sync::Arc;

use super::format::ReportFormat;
use super::record::{ReportKind, ReportRecord, INVALID_PORT};
use crate::event::PacketEvent;
use crate::types::{DropReasonCode, HeaderVersion};

/// Outcome of the drop/queue/flow decisions for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportBits {
    pub drop: bool,
    pub queue: bool,
    pub flow: bool,
}

impl ReportBits {
    pub fn any(&self) -> bool {
        self.drop || self.queue || self.flow
    }
}

/// Builds report records for one switch.
#[derive(Debug, Clone)]
pub struct ReportComposer {
    switch_id: u32,
    hw_id: u8,
    format: Arc<dyn ReportFormat>,
}

impl ReportComposer {
    pub fn new(switch_id: u32, hw_id: u8, format: Arc<dyn ReportFormat>) -> Self {
        Self {
            switch_id,
            hw_id,
            format,
        }
    }

    pub fn format(&self) -> &Arc<dyn ReportFormat> {
        &self.format
    }

    pub fn header_version(&self) -> HeaderVersion {
        self.format.version()
    }

    /// Builds the record, or `None` when no report bit is set.
    ///
    /// `truncate_size` of 0 keeps the whole inner packet.
    pub fn compose(
        &self,
        event: &PacketEvent,
        bits: ReportBits,
        truncate_size: usize,
    ) -> Option<ReportRecord> {
        if !bits.any() {
            return None;
        }

        let kind = if bits.drop {
            ReportKind::Mod
        } else if bits.queue && event.is_drop() {
            ReportKind::TailDrop
        } else {
            ReportKind::Postcard
        };

        let original_length = event.packet.len();
        let keep = match truncate_size {
            0 => original_length,
            size => original_length.min(size),
        };

        Some(ReportRecord {
            kind,
            d_bit: bits.drop,
            q_bit: bits.queue,
            f_bit: bits.flow,
            switch_id: self.switch_id,
            hw_id: self.hw_id,
            ingress_port: event.ingress_port,
            egress_port: event.egress_port.unwrap_or(INVALID_PORT),
            queue_id: event.queue_id,
            queue_depth: event.queue_depth,
            hop_latency_ns: u32::try_from(event.hop_latency_ns()).unwrap_or(u32::MAX),
            ingress_timestamp_ns: event.ingress_timestamp_ns,
            egress_timestamp_ns: event.egress_timestamp_ns,
            drop_reason: event.drop_reason.unwrap_or(DropReasonCode::UNKNOWN),
            inner_packet: event.packet[..keep].to_vec(),
            original_length,
            sequence_number: 0,
            flow: event.flow_key(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::format_for;
    use pretty_assertions::assert_eq;

    fn composer() -> ReportComposer {
        ReportComposer::new(7, 1, format_for(HeaderVersion::V2))
    }

    fn event(len: usize) -> PacketEvent {
        serde_json::from_value(serde_json::json!({
            "ingress_port": 1,
            "egress_port": 2,
            "ingress_timestamp_ns": 100,
            "egress_timestamp_ns": 350,
            "packet": vec![0xab; len],
        }))
        .unwrap()
    }

    #[test]
    fn test_no_bits_no_record() {
        assert!(composer()
            .compose(&event(10), ReportBits::default(), 0)
            .is_none());
    }

    #[test]
    fn test_postcard_record() {
        let bits = ReportBits {
            flow: true,
            ..Default::default()
        };
        let rec = composer().compose(&event(10), bits, 0).unwrap();
        assert_eq!(rec.kind, ReportKind::Postcard);
        assert!(rec.f_bit && !rec.d_bit && !rec.q_bit);
        assert_eq!(rec.hop_latency_ns, 250);
        assert_eq!(rec.switch_id, 7);
        assert_eq!(rec.inner_packet.len(), 10);
        assert!(!rec.is_truncated());
    }

    #[test]
    fn test_truncation() {
        let bits = ReportBits {
            flow: true,
            ..Default::default()
        };
        let rec = composer().compose(&event(100), bits, 64).unwrap();
        assert_eq!(rec.inner_packet.len(), 64);
        assert_eq!(rec.original_length, 100);
        assert_eq!(rec.truncated_bytes(), 36);

        let short = composer().compose(&event(20), bits, 64).unwrap();
        assert!(!short.is_truncated());
    }

    #[test]
    fn test_drop_kinds() {
        let mut dropped = event(10);
        dropped.egress_port = None;
        dropped.drop_reason = Some(DropReasonCode::ACL_DENY);

        let rec = composer()
            .compose(
                &dropped,
                ReportBits {
                    drop: true,
                    flow: true,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(rec.kind, ReportKind::Mod);
        assert_eq!(rec.egress_port, INVALID_PORT);
        assert_eq!(rec.drop_reason, DropReasonCode::ACL_DENY);

        let mut tail = event(10);
        tail.drop_reason = Some(DropReasonCode::TRAFFIC_MANAGER);
        tail.tail_drop = true;
        let rec = composer()
            .compose(
                &tail,
                ReportBits {
                    queue: true,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(rec.kind, ReportKind::TailDrop);
    }
}

//! Telemetry report header formats.
//!
//! The format is a capability of the switch: it is chosen once when the
//! engine is built and every report goes through the same encoder.

use byteorder::{BigEndian, WriteBytesExt};
use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use super::record::{ReportKind, ReportRecord};
use crate::types::HeaderVersion;

/// Serializes a report record (everything after the outer UDP header).
pub trait ReportFormat: Send + Sync + Debug {
    fn version(&self) -> HeaderVersion;

    /// Bytes preceding the inner packet for this record.
    fn header_len(&self, record: &ReportRecord) -> usize;

    fn encode(&self, record: &ReportRecord, out: &mut Vec<u8>) -> io::Result<()>;
}

/// Returns the encoder for a header version.
pub fn format_for(version: HeaderVersion) -> Arc<dyn ReportFormat> {
    match version {
        HeaderVersion::V1 => Arc::new(V1Format),
        HeaderVersion::V2 => Arc::new(V2Format),
    }
}

fn flag(bit: bool, shift: u8) -> u8 {
    u8::from(bit) << shift
}

fn dqf_bits(record: &ReportRecord, d: u8, q: u8, f: u8) -> u8 {
    flag(record.d_bit, d) | flag(record.q_bit, q) | flag(record.f_bit, f)
}

// ============ v1 ============

const V1_FIXED_LEN: usize = 12;
const V1_POSTCARD_LEN: usize = 16;
const V1_MOD_LEN: usize = 12;

/// v1 next-protocol: postcard local report header follows.
pub const V1_NEXT_PROTO_POSTCARD: u8 = 1;
/// v1 next-protocol: MOD (drop) local report header follows.
pub const V1_NEXT_PROTO_MOD: u8 = 2;

/// v1 report: 12-byte fixed header, then a local report sub-header.
///
/// ```text
/// ver(4)=0 next_proto(4) | d q f rsvd(5) | rsvd(10) hw_id(6)
/// sequence(32)
/// timestamp(32)                       ingress timestamp, low 32 bits
/// postcard: switch_id(32) in_port(16) eg_port(16) queue(8) depth(24) eg_ts(32)
/// mod:      switch_id(32) in_port(16) eg_port(16) queue(8) reason(8) pad(16)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Format;

impl ReportFormat for V1Format {
    fn version(&self) -> HeaderVersion {
        HeaderVersion::V1
    }

    fn header_len(&self, record: &ReportRecord) -> usize {
        V1_FIXED_LEN
            + if record.kind.carries_drop_reason() {
                V1_MOD_LEN
            } else {
                V1_POSTCARD_LEN
            }
    }

    fn encode(&self, record: &ReportRecord, out: &mut Vec<u8>) -> io::Result<()> {
        let next_proto = match record.kind {
            ReportKind::Postcard => V1_NEXT_PROTO_POSTCARD,
            ReportKind::Mod | ReportKind::TailDrop => V1_NEXT_PROTO_MOD,
        };

        out.write_u8(next_proto)?;
        out.write_u8(dqf_bits(record, 7, 6, 5))?;
        out.write_u16::<BigEndian>(u16::from(record.hw_id & 0x3f))?;
        out.write_u32::<BigEndian>(record.sequence_number)?;
        out.write_u32::<BigEndian>(record.ingress_timestamp_ns as u32)?;

        out.write_u32::<BigEndian>(record.switch_id)?;
        out.write_u16::<BigEndian>(record.ingress_port)?;
        out.write_u16::<BigEndian>(record.egress_port)?;
        out.write_u8(record.queue_id)?;
        if record.kind.carries_drop_reason() {
            out.write_u8(record.drop_reason.code())?;
            out.write_u16::<BigEndian>(0)?;
        } else {
            out.write_u24::<BigEndian>(record.queue_depth.min(0x00ff_ffff))?;
            out.write_u32::<BigEndian>(record.egress_timestamp_ns as u32)?;
        }

        out.extend_from_slice(&record.inner_packet);
        Ok(())
    }
}

// ============ v2 ============

const V2_FIXED_LEN: usize = 12;
const V2_MD_HEADER_LEN: usize = 8;
const V2_BASE_MD_WORDS: usize = 7;

/// v2 report type: INT.
pub const V2_REP_TYPE_INT: u8 = 1;
/// v2 inner type: Ethernet.
pub const V2_IN_TYPE_ETHERNET: u8 = 3;

pub const V2_MD_PORT_IDS: u16 = 0x4000;
pub const V2_MD_HOP_LATENCY: u16 = 0x2000;
pub const V2_MD_QUEUE_OCCUPANCY: u16 = 0x1000;
pub const V2_MD_INGRESS_TS: u16 = 0x0800;
pub const V2_MD_EGRESS_TS: u16 = 0x0400;
pub const V2_MD_DROP_REASON: u16 = 0x0002;

/// v2 report: fixed header with inline switch ID, then metadata words.
///
/// ```text
/// ver(4)=2 hw_id(6) sequence(22)
/// switch_id(32)
/// rep_type(4) in_type(4) report_length(8) md_length(8) d q f i rsvd(4)
/// rep_md_bits(16) domain_specific_id(16)
/// ds_md_bits(16) ds_md_status(16)
/// in_port(16) eg_port(16)
/// hop_latency(32)
/// queue(8) occupancy(24)
/// ingress_ts(64)
/// egress_ts(64)
/// [queue(8) drop_reason(8) pad(16)]
/// ```
///
/// `md_length` counts metadata words; `report_length` counts words of
/// metadata plus inner packet, derived from the untruncated packet and
/// reduced by the truncated byte count rounded up to words.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Format;

impl V2Format {
    fn md_words(record: &ReportRecord) -> usize {
        V2_BASE_MD_WORDS + usize::from(record.kind.carries_drop_reason())
    }

    /// `report_length` field value.
    ///
    /// The field is 8 bits wide. Once metadata plus the kept inner packet
    /// exceed 255 words (an inner packet of about 990 bytes) the value pins
    /// at 255 and no longer reflects the byte count; the IPv4 and UDP
    /// lengths stay exact.
    pub fn report_length(record: &ReportRecord) -> u8 {
        let full = Self::md_words(record) + record.original_length.div_ceil(4);
        let removed = record.truncated_bytes().div_ceil(4);
        u8::try_from(full.saturating_sub(removed)).unwrap_or(u8::MAX)
    }
}

impl ReportFormat for V2Format {
    fn version(&self) -> HeaderVersion {
        HeaderVersion::V2
    }

    fn header_len(&self, record: &ReportRecord) -> usize {
        V2_FIXED_LEN + V2_MD_HEADER_LEN + Self::md_words(record) * 4
    }

    fn encode(&self, record: &ReportRecord, out: &mut Vec<u8>) -> io::Result<()> {
        let md_words = Self::md_words(record);
        let mut md_bits = V2_MD_PORT_IDS
            | V2_MD_HOP_LATENCY
            | V2_MD_QUEUE_OCCUPANCY
            | V2_MD_INGRESS_TS
            | V2_MD_EGRESS_TS;
        if record.kind.carries_drop_reason() {
            md_bits |= V2_MD_DROP_REASON;
        }

        let first_word = (2u32 << 28)
            | (u32::from(record.hw_id & 0x3f) << 22)
            | (record.sequence_number & 0x003f_ffff);
        out.write_u32::<BigEndian>(first_word)?;
        out.write_u32::<BigEndian>(record.switch_id)?;
        out.write_u8((V2_REP_TYPE_INT << 4) | V2_IN_TYPE_ETHERNET)?;
        out.write_u8(Self::report_length(record))?;
        out.write_u8(md_words as u8)?;
        out.write_u8(dqf_bits(record, 7, 6, 5))?;
        out.write_u16::<BigEndian>(md_bits)?;
        out.write_u16::<BigEndian>(0)?;
        out.write_u16::<BigEndian>(0)?;
        out.write_u16::<BigEndian>(0)?;

        out.write_u16::<BigEndian>(record.ingress_port)?;
        out.write_u16::<BigEndian>(record.egress_port)?;
        out.write_u32::<BigEndian>(record.hop_latency_ns)?;
        out.write_u8(record.queue_id)?;
        out.write_u24::<BigEndian>(record.queue_depth.min(0x00ff_ffff))?;
        out.write_u64::<BigEndian>(record.ingress_timestamp_ns)?;
        out.write_u64::<BigEndian>(record.egress_timestamp_ns)?;
        if record.kind.carries_drop_reason() {
            out.write_u8(record.queue_id)?;
            out.write_u8(record.drop_reason.code())?;
            out.write_u16::<BigEndian>(0)?;
        }

        out.extend_from_slice(&record.inner_packet);
        Ok(())
    }
}

//! Report distribution: outer encapsulation, destination choice and
//! per-destination sequence numbering.

use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{DtelError, Result};
use crate::hash::{balance_index, entropy_port};
use crate::report::wire::{write_outer_header, OuterHeader, OUTER_HEADER_LEN};
use crate::report::{ReportFormat, ReportRecord};
use crate::session::{Destination, DistributionMode, ReportSession, UdpSrcPortMode};

/// Transport for finished report frames.
///
/// `frame` is the complete Ethernet frame including the outer IPv4/UDP
/// headers. Implementations must not block the packet path.
pub trait ReportSink: Send + Sync {
    fn transmit(&self, destination: SocketAddrV4, frame: &[u8]) -> Result<()>;
}

/// A frame handed to a [`CaptureSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedReport {
    pub destination: SocketAddrV4,
    pub frame: Vec<u8>,
}

/// Sink that keeps every frame in memory. Used by dry runs and tests.
#[derive(Debug, Default)]
pub struct CaptureSink {
    frames: Mutex<Vec<CapturedReport>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything captured so far.
    pub fn take(&self) -> Vec<CapturedReport> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn sent_to(&self, ip: Ipv4Addr) -> usize {
        self.frames
            .lock()
            .iter()
            .filter(|r| *r.destination.ip() == ip)
            .count()
    }
}

impl ReportSink for CaptureSink {
    fn transmit(&self, destination: SocketAddrV4, frame: &[u8]) -> Result<()> {
        self.frames.lock().push(CapturedReport {
            destination,
            frame: frame.to_vec(),
        });
        Ok(())
    }
}

/// Copies emitted for one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitSummary {
    pub sent: u32,
    pub failed: u32,
}

/// Encapsulates records and hands them to the sink.
#[derive(Clone)]
pub struct Distributor {
    format: Arc<dyn ReportFormat>,
    sink: Arc<dyn ReportSink>,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl Distributor {
    pub fn new(format: Arc<dyn ReportFormat>, sink: Arc<dyn ReportSink>) -> Self {
        Self { format, sink }
    }

    /// Destinations that receive this record under the session's mode.
    pub fn targets<'a>(
        &self,
        session: &'a ReportSession,
        record: &ReportRecord,
    ) -> Vec<&'a Arc<Destination>> {
        let destinations = session.destinations();
        match session.config().distribution {
            DistributionMode::LoadBalance => destinations
                .get(balance_index(&record.flow, destinations.len()))
                .into_iter()
                .collect(),
            DistributionMode::Replicate => destinations.iter().collect(),
        }
    }

    /// Emits one copy per target destination.
    ///
    /// Each copy consumes the destination's next sequence number, whether
    /// or not the transport accepts it. Numbering and hand-off to the sink
    /// happen under the destination's lock, so concurrent callers deliver
    /// to a destination in sequence order.
    pub fn emit(&self, mut record: ReportRecord, session: &ReportSession, tos: u8) -> EmitSummary {
        let config = session.config();
        let udp_src_port = match config.src_port_mode() {
            UdpSrcPortMode::Fixed(port) => port,
            UdpSrcPortMode::Entropy => entropy_port(&record.flow),
        };

        let mut summary = EmitSummary::default();
        for destination in self.targets(session, &record) {
            let header = OuterHeader {
                src_mac: config.src_mac,
                dst_mac: config.dst_mac,
                src_ip: config.src_ip,
                dst_ip: destination.ip(),
                ttl: config.ttl,
                tos,
                udp_src_port,
                udp_dst_port: config.udp_dst_port,
            };

            let address = SocketAddrV4::new(destination.ip(), config.udp_dst_port);
            let result = destination.sequenced(|sequence| {
                record.sequence_number = sequence;
                self.frame(&header, &record)
                    .and_then(|frame| self.sink.transmit(address, &frame))
            });

            match result {
                Ok(()) => summary.sent += 1,
                Err(DtelError::Transmit { destination, reason }) => {
                    debug!(%destination, "Report not sent: {}", reason);
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(destination = %destination.ip(), "Report dropped: {}", e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn frame(&self, header: &OuterHeader, record: &ReportRecord) -> Result<Vec<u8>> {
        let payload_len = self.format.header_len(record) + record.inner_packet.len();
        let mut frame = Vec::with_capacity(OUTER_HEADER_LEN + payload_len);
        write_outer_header(&mut frame, header, payload_len)?;
        self.format.encode(record, &mut frame)?;
        Ok(frame)
    }
}

//! UDP transport for DTEL reports.
//!
//! The engine builds complete frames. The kernel supplies the outer
//! Ethernet/IPv4/UDP headers for a datagram socket, so the sink strips
//! them and sends the report payload to the collector.

use sonic_dtel::report::wire::OUTER_HEADER_LEN;
use sonic_dtel::{DtelError, ReportSink};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::error::Result;

/// Non-blocking UDP report sender.
#[derive(Debug)]
pub struct UdpReportSink {
    socket: UdpSocket,
}

impl UdpReportSink {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Report socket bound to {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl ReportSink for UdpReportSink {
    fn transmit(&self, destination: SocketAddrV4, frame: &[u8]) -> sonic_dtel::Result<()> {
        let payload = frame
            .get(OUTER_HEADER_LEN..)
            .ok_or_else(|| DtelError::Encode(format!("short frame ({} bytes)", frame.len())))?;

        self.socket
            .try_send_to(payload, SocketAddr::V4(destination))
            .map(|_| ())
            .map_err(|e| DtelError::Transmit {
                destination: *destination.ip(),
                reason: e.to_string(),
            })
    }
}

/// Counts reports and throws them away. Used by `--dry-run`.
#[derive(Debug, Default)]
pub struct DiscardSink {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ReportSink for DiscardSink {
    fn transmit(&self, destination: SocketAddrV4, frame: &[u8]) -> sonic_dtel::Result<()> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        trace!(%destination, len = frame.len(), "Discarded report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn loopback() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[tokio::test]
    async fn test_sends_payload_without_outer_header() {
        let collector = UdpSocket::bind(loopback()).await.unwrap();
        let target = match collector.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!(),
        };
        let sink = UdpReportSink::bind(loopback()).await.unwrap();

        let mut frame = vec![0u8; OUTER_HEADER_LEN];
        frame.extend_from_slice(b"report");
        sink.transmit(target, &frame).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = collector.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"report");
    }

    #[test]
    fn test_discard_sink_counts() {
        let sink = DiscardSink::new();
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
        sink.transmit(target, &[0u8; 100]).unwrap();
        sink.transmit(target, &[0u8; 60]).unwrap();
        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.bytes(), 160);
    }

    #[tokio::test]
    async fn test_short_frame_is_rejected() {
        let sink = UdpReportSink::bind(loopback()).await.unwrap();
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
        assert!(matches!(
            sink.transmit(target, &[0u8; 10]),
            Err(DtelError::Encode(_))
        ));
    }
}

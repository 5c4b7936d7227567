//! Packet events handed to the engine by the forwarding pipeline.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::types::{DropReasonCode, QueueKey};

/// IP protocol number for TCP.
pub const IP_PROTOCOL_TCP: u8 = 6;

/// Decoded ingress/egress metadata for one packet.
///
/// `egress_port` is `None` when the packet never reached an egress port
/// (dropped in the ingress pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketEvent {
    pub ingress_port: u16,
    #[serde(default)]
    pub egress_port: Option<u16>,
    #[serde(default)]
    pub lag_id: Option<u16>,
    #[serde(default)]
    pub vlan_id: Option<u16>,

    #[serde(default)]
    pub ingress_timestamp_ns: u64,
    #[serde(default)]
    pub egress_timestamp_ns: u64,

    #[serde(default)]
    pub queue_id: u8,
    #[serde(default)]
    pub queue_depth: u32,

    #[serde(default)]
    pub drop_reason: Option<DropReasonCode>,
    /// Dropped because the egress queue was full.
    #[serde(default)]
    pub tail_drop: bool,

    #[serde(default = "default_addr")]
    pub src_ip: IpAddr,
    #[serde(default = "default_addr")]
    pub dst_ip: IpAddr,
    #[serde(default)]
    pub ip_protocol: u8,
    #[serde(default)]
    pub l4_src_port: u16,
    #[serde(default)]
    pub l4_dst_port: u16,
    #[serde(default)]
    pub ttl: u8,
    #[serde(default)]
    pub tcp_flags: u8,
    #[serde(default = "default_ether_type")]
    pub ether_type: u16,
    #[serde(default)]
    pub port_label: u32,
    /// Tunnel VNI for overlay flows.
    #[serde(default)]
    pub vni: Option<u32>,

    /// Captured inner packet, starting at its Ethernet header.
    #[serde(default)]
    pub packet: Vec<u8>,
}

fn default_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_ether_type() -> u16 {
    0x0800
}

impl PacketEvent {
    pub fn is_drop(&self) -> bool {
        self.drop_reason.is_some()
    }

    /// Time spent in the switch, zero if timestamps are inverted.
    pub fn hop_latency_ns(&self) -> u64 {
        self.egress_timestamp_ns
            .saturating_sub(self.ingress_timestamp_ns)
    }

    /// Egress queue this packet was (or would have been) enqueued on.
    pub fn queue_key(&self) -> Option<QueueKey> {
        self.egress_port
            .map(|port| QueueKey::new(port, self.queue_id))
    }

    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            ingress_port: self.ingress_port,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            ip_protocol: self.ip_protocol,
            l4_src_port: self.l4_src_port,
            l4_dst_port: self.l4_dst_port,
            vni: self.vni,
        }
    }
}

/// Flow identity. Only ever hashed; the suppression table never stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub ingress_port: u16,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub ip_protocol: u8,
    pub l4_src_port: u16,
    pub l4_dst_port: u16,
    pub vni: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_minimal_event() {
        let event: PacketEvent = serde_json::from_str(
            r#"{"ingress_port": 3, "egress_port": 5, "dst_ip": "10.0.0.1", "ip_protocol": 6}"#,
        )
        .unwrap();

        assert_eq!(event.ingress_port, 3);
        assert_eq!(event.queue_key(), Some(QueueKey::new(5, 0)));
        assert_eq!(event.ether_type, 0x0800);
        assert!(!event.is_drop());
    }

    #[test]
    fn test_hop_latency_saturates() {
        let event: PacketEvent = serde_json::from_str(
            r#"{"ingress_port": 1, "ingress_timestamp_ns": 500, "egress_timestamp_ns": 100}"#,
        )
        .unwrap();
        assert_eq!(event.hop_latency_ns(), 0);
    }

    #[test]
    fn test_flow_key_ignores_timestamps() {
        let mut a: PacketEvent =
            serde_json::from_str(r#"{"ingress_port": 1, "dst_ip": "10.0.0.1"}"#).unwrap();
        let b = a.clone();
        a.ingress_timestamp_ns = 42;
        assert_eq!(a.flow_key(), b.flow_key());
    }
}

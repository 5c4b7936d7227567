//! Watch rule and match key.

use serde::{Deserialize, Serialize};
use sonic_types::{IpPrefix, PortRange, Ternary};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{DtelError, Result};
use crate::event::PacketEvent;
use crate::types::{BindPoint, Direction, ReportTypeMask};

/// L4 port match: ternary value/mask or inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum L4PortMatch {
    Range(PortRange),
    Ternary(Ternary<u16>),
}

impl L4PortMatch {
    fn matches(&self, port: u16) -> bool {
        match self {
            Self::Range(range) => range.contains(port),
            Self::Ternary(t) => t.matches(port),
        }
    }

    fn care_bits(&self) -> u32 {
        match self {
            Self::Range(range) => range.care_bits(),
            Self::Ternary(t) => t.care_bits(),
        }
    }
}

/// Ternary match key over the packet 5-tuple and pipeline metadata.
///
/// Absent fields are full wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchKey {
    pub src_ip: Option<IpPrefix>,
    pub dst_ip: Option<IpPrefix>,
    pub ip_protocol: Option<Ternary<u8>>,
    pub l4_src_port: Option<L4PortMatch>,
    pub l4_dst_port: Option<L4PortMatch>,
    pub ttl: Option<Ternary<u8>>,
    pub tcp_flags: Option<Ternary<u8>>,
    pub ether_type: Option<Ternary<u16>>,
    pub port_label: Option<Ternary<u32>>,
}

impl MatchKey {
    /// Returns true if every present field matches the event.
    pub fn matches(&self, event: &PacketEvent) -> bool {
        self.src_ip.map_or(true, |p| p.contains(&event.src_ip))
            && self.dst_ip.map_or(true, |p| p.contains(&event.dst_ip))
            && self
                .ip_protocol
                .map_or(true, |t| t.matches(event.ip_protocol))
            && self
                .l4_src_port
                .map_or(true, |m| m.matches(event.l4_src_port))
            && self
                .l4_dst_port
                .map_or(true, |m| m.matches(event.l4_dst_port))
            && self.ttl.map_or(true, |t| t.matches(event.ttl))
            && self.tcp_flags.map_or(true, |t| t.matches(event.tcp_flags))
            && self.ether_type.map_or(true, |t| t.matches(event.ether_type))
            && self.port_label.map_or(true, |t| t.matches(event.port_label))
    }

    /// Total non-wildcard bits. Higher is more specific.
    pub fn specificity(&self) -> u32 {
        let prefix_bits = |p: &Option<IpPrefix>| p.map_or(0, |p| u32::from(p.prefix_len()));

        prefix_bits(&self.src_ip)
            + prefix_bits(&self.dst_ip)
            + self.ip_protocol.map_or(0, |t| t.care_bits())
            + self.l4_src_port.map_or(0, |m| m.care_bits())
            + self.l4_dst_port.map_or(0, |m| m.care_bits())
            + self.ttl.map_or(0, |t| t.care_bits())
            + self.tcp_flags.map_or(0, |t| t.care_bits())
            + self.ether_type.map_or(0, |t| t.care_bits())
            + self.port_label.map_or(0, |t| t.care_bits())
    }
}

fn default_priority() -> u32 {
    100
}

/// A single watchlist entry.
///
/// Numerically lower `priority` wins. A rule whose `report_types` is
/// [`ReportTypeMask::NONE`] is an explicit exclude: when it wins, the
/// packet produces no report in that direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRule {
    pub id: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub bind_point: BindPoint,
    #[serde(default)]
    pub report_types: ReportTypeMask,
    #[serde(default)]
    pub report_all_packets: bool,
    #[serde(default, rename = "match")]
    pub key: MatchKey,
}

impl WatchRule {
    /// Creates a switch-global ingress rule.
    pub fn new(id: impl Into<String>, priority: u32, key: MatchKey, report_types: ReportTypeMask) -> Self {
        Self {
            id: id.into(),
            priority,
            direction: Direction::Ingress,
            bind_point: BindPoint::Switch,
            key,
            report_types,
            report_all_packets: false,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_bind_point(mut self, bind_point: BindPoint) -> Self {
        self.bind_point = bind_point;
        self
    }

    pub fn with_report_all_packets(mut self, report_all: bool) -> Self {
        self.report_all_packets = report_all;
        self
    }

    /// Validates the rule before installation.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(DtelError::InvalidRule {
                id: self.id.clone(),
                reason: "rule id must not be empty".to_string(),
            });
        }

        if let (Some(src), Some(dst)) = (self.key.src_ip, self.key.dst_ip) {
            if src.is_ipv4() != dst.is_ipv4() {
                return Err(DtelError::InvalidRule {
                    id: self.id.clone(),
                    reason: format!("mixed address families: {} / {}", src, dst),
                });
            }
        }

        Ok(())
    }

    /// Precedence order: priority ascending, then most specific key, then
    /// rule ID so equal rules still resolve deterministically.
    pub fn precedence(&self, other: &WatchRule) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.key.specificity().cmp(&self.key.specificity()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for WatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (prio {}, {} {}, {})",
            self.id, self.priority, self.direction, self.bind_point, self.report_types
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(dst: &str) -> PacketEvent {
        serde_json::from_value(serde_json::json!({
            "ingress_port": 1,
            "src_ip": "10.0.0.1",
            "dst_ip": dst,
            "ip_protocol": 6,
            "l4_src_port": 5000,
            "l4_dst_port": 80,
            "ttl": 64,
            "tcp_flags": 0x12,
        }))
        .unwrap()
    }

    fn dst_key(prefix: &str) -> MatchKey {
        MatchKey {
            dst_ip: Some(prefix.parse().unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_key_matches_everything() {
        assert!(MatchKey::default().matches(&event("1.2.3.4")));
        assert_eq!(MatchKey::default().specificity(), 0);
    }

    #[test]
    fn test_key_fields_are_anded() {
        let key = MatchKey {
            dst_ip: Some("10.10.10.0/24".parse().unwrap()),
            ip_protocol: Some(Ternary::exact(6)),
            l4_dst_port: Some(L4PortMatch::Range(PortRange::new(0, 1023).unwrap())),
            tcp_flags: Some("0x02/0x02".parse().unwrap()),
            ..Default::default()
        };
        assert!(key.matches(&event("10.10.10.5")));
        assert!(!key.matches(&event("10.10.11.5")));

        let udp_only = MatchKey {
            ip_protocol: Some(Ternary::exact(17)),
            ..key
        };
        assert!(!udp_only.matches(&event("10.10.10.5")));
    }

    #[test]
    fn test_specificity_prefers_longer_prefix() {
        assert!(dst_key("10.0.0.0/28").specificity() > dst_key("10.0.0.0/24").specificity());
    }

    #[test]
    fn test_precedence_ordering() {
        let wide = WatchRule::new("wide", 10, dst_key("10.0.0.0/24"), ReportTypeMask::FLOW);
        let narrow = WatchRule::new("narrow", 10, dst_key("10.0.0.0/28"), ReportTypeMask::NONE);
        let urgent = WatchRule::new("urgent", 1, dst_key("10.0.0.0/8"), ReportTypeMask::FLOW);

        assert_eq!(narrow.precedence(&wide), Ordering::Less);
        assert_eq!(urgent.precedence(&narrow), Ordering::Less);
    }

    #[test]
    fn test_validate_rejects_mixed_families() {
        let mut rule = WatchRule::new("r", 1, dst_key("10.0.0.0/24"), ReportTypeMask::FLOW);
        rule.key.src_ip = Some("2001:db8::/32".parse().unwrap());
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_deserialize_rule_from_toml() {
        let rule: WatchRule = toml::from_str(
            r#"
            id = "web"
            priority = 20
            direction = "egress"
            bind_point = "PORT:7"
            report_types = "FLOW|QUEUE"
            report_all_packets = true

            [match]
            dst_ip = "10.1.0.0/16"
            ip_protocol = 6
            l4_dst_port = "80-89"
            tcp_flags = "0x02/0x02"
            "#,
        )
        .unwrap();

        assert_eq!(rule.direction, Direction::Egress);
        assert_eq!(rule.bind_point, BindPoint::Port(7));
        assert!(rule.report_types.contains(ReportTypeMask::QUEUE));
        assert_eq!(
            rule.key.l4_dst_port,
            Some(L4PortMatch::Range(PortRange::new(80, 89).unwrap()))
        );
    }
}

//! DTEL types shared across the report pipeline.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// DTEL event types.
///
/// Each event type carries a global enable flag and a DSCP value for the
/// reports it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtelEventType {
    FlowState,
    FlowReportAllPackets,
    FlowTcpFlag,
    QueueReportThresholdBreach,
    QueueReportTailDrop,
    DropReport,
}

impl DtelEventType {
    pub const ALL: [DtelEventType; 6] = [
        DtelEventType::FlowState,
        DtelEventType::FlowReportAllPackets,
        DtelEventType::FlowTcpFlag,
        DtelEventType::QueueReportThresholdBreach,
        DtelEventType::QueueReportTailDrop,
        DtelEventType::DropReport,
    ];

    /// Dense index for per-event tables.
    pub const fn index(self) -> usize {
        match self {
            Self::FlowState => 0,
            Self::FlowReportAllPackets => 1,
            Self::FlowTcpFlag => 2,
            Self::QueueReportThresholdBreach => 3,
            Self::QueueReportTailDrop => 4,
            Self::DropReport => 5,
        }
    }
}

impl fmt::Display for DtelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowState => write!(f, "EVENT_TYPE_FLOW_STATE"),
            Self::FlowReportAllPackets => write!(f, "EVENT_TYPE_FLOW_REPORT_ALL_PACKETS"),
            Self::FlowTcpFlag => write!(f, "EVENT_TYPE_FLOW_TCPFLAG"),
            Self::QueueReportThresholdBreach => {
                write!(f, "EVENT_TYPE_QUEUE_REPORT_THRESHOLD_BREACH")
            }
            Self::QueueReportTailDrop => write!(f, "EVENT_TYPE_QUEUE_REPORT_TAIL_DROP"),
            Self::DropReport => write!(f, "EVENT_TYPE_DROP_REPORT"),
        }
    }
}

/// Bitset of requested report types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReportTypeMask(u8);

impl ReportTypeMask {
    /// Explicit "exclude" mask: matching rules suppress lower-priority ones.
    pub const NONE: Self = Self(0);
    pub const FLOW: Self = Self(0b001);
    pub const DROP: Self = Self(0b010);
    pub const QUEUE: Self = Self(0b100);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ReportTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for ReportTypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = [(Self::FLOW, "FLOW"), (Self::DROP, "DROP"), (Self::QUEUE, "QUEUE")]
            .into_iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

impl FromStr for ReportTypeMask {
    type Err = String;

    /// Parses `NONE` or a `|`/`,` separated list such as `DROP|FLOW`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = Self::NONE;
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            mask = mask
                | match part.to_uppercase().as_str() {
                    "NONE" => Self::NONE,
                    "FLOW" => Self::FLOW,
                    "DROP" => Self::DROP,
                    "QUEUE" => Self::QUEUE,
                    _ => return Err(format!("Unknown report type: {}", part)),
                };
        }
        Ok(mask)
    }
}

impl Serialize for ReportTypeMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReportTypeMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

/// Pipeline direction a watch rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "INGRESS"),
            Self::Egress => write!(f, "EGRESS"),
        }
    }
}

/// Scope a watch rule is bound to.
///
/// Narrower scopes are consulted first; switch-global rules only apply
/// when no port, LAG or VLAN rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindPoint {
    Port(u16),
    Lag(u16),
    Vlan(u16),
    #[default]
    Switch,
}

impl fmt::Display for BindPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(p) => write!(f, "PORT:{}", p),
            Self::Lag(l) => write!(f, "LAG:{}", l),
            Self::Vlan(v) => write!(f, "VLAN:{}", v),
            Self::Switch => write!(f, "SWITCH"),
        }
    }
}

impl FromStr for BindPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        if upper == "SWITCH" {
            return Ok(Self::Switch);
        }
        let (kind, id) = upper
            .split_once(':')
            .ok_or_else(|| format!("Unknown bind point: {}", s))?;
        let id: u16 = id
            .parse()
            .map_err(|_| format!("Invalid bind point id: {}", s))?;
        match kind {
            "PORT" => Ok(Self::Port(id)),
            "LAG" => Ok(Self::Lag(id)),
            "VLAN" => Ok(Self::Vlan(id)),
            _ => Err(format!("Unknown bind point type: {}", kind)),
        }
    }
}

impl Serialize for BindPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BindPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

/// Drop reason code reported by the forwarding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DropReasonCode(pub u8);

impl DropReasonCode {
    pub const UNKNOWN: Self = Self(0);
    pub const OUTER_SRC_MAC_ZERO: Self = Self(10);
    pub const OUTER_SRC_MAC_MULTICAST: Self = Self(11);
    pub const OUTER_DST_MAC_ZERO: Self = Self(12);
    pub const OUTER_IP_VERSION_INVALID: Self = Self(25);
    pub const OUTER_IP_TTL_ZERO: Self = Self(26);
    pub const OUTER_IP_SRC_LOOPBACK: Self = Self(30);
    pub const TRAFFIC_MANAGER: Self = Self(71);
    pub const ACL_DENY: Self = Self(80);

    pub const fn code(self) -> u8 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::UNKNOWN => "UNKNOWN",
            Self::OUTER_SRC_MAC_ZERO => "OUTER_SRC_MAC_ZERO",
            Self::OUTER_SRC_MAC_MULTICAST => "OUTER_SRC_MAC_MULTICAST",
            Self::OUTER_DST_MAC_ZERO => "OUTER_DST_MAC_ZERO",
            Self::OUTER_IP_VERSION_INVALID => "OUTER_IP_VERSION_INVALID",
            Self::OUTER_IP_TTL_ZERO => "OUTER_IP_TTL_ZERO",
            Self::OUTER_IP_SRC_LOOPBACK => "OUTER_IP_SRC_LOOPBACK",
            Self::TRAFFIC_MANAGER => "TRAFFIC_MANAGER",
            Self::ACL_DENY => "ACL_DENY",
            _ => return None,
        })
    }
}

impl fmt::Display for DropReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A monitored egress queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueKey {
    pub port: u16,
    pub queue: u8,
}

impl QueueKey {
    pub const fn new(port: u16, queue: u8) -> Self {
        Self { port, queue }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.port, self.queue)
    }
}

/// Telemetry report header version, fixed per switch instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderVersion {
    V1,
    #[default]
    V2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_type_mask_parse() {
        let mask: ReportTypeMask = "DROP|FLOW".parse().unwrap();
        assert!(mask.contains(ReportTypeMask::DROP));
        assert!(mask.contains(ReportTypeMask::FLOW));
        assert!(!mask.contains(ReportTypeMask::QUEUE));
        assert_eq!(mask.to_string(), "FLOW|DROP");

        let none: ReportTypeMask = "NONE".parse().unwrap();
        assert!(none.is_empty());
        assert!(!none.contains(ReportTypeMask::NONE));

        assert!("BOGUS".parse::<ReportTypeMask>().is_err());
    }

    #[test]
    fn test_bind_point_parse() {
        assert_eq!("switch".parse::<BindPoint>().unwrap(), BindPoint::Switch);
        assert_eq!("PORT:4".parse::<BindPoint>().unwrap(), BindPoint::Port(4));
        assert_eq!("lag:2".parse::<BindPoint>().unwrap(), BindPoint::Lag(2));
        assert!("PORT".parse::<BindPoint>().is_err());
        assert!("RIF:1".parse::<BindPoint>().is_err());
    }

    #[test]
    fn test_event_type_index_is_dense() {
        for (i, event) in DtelEventType::ALL.iter().enumerate() {
            assert_eq!(event.index(), i);
        }
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReasonCode::ACL_DENY.to_string(), "ACL_DENY(80)");
        assert_eq!(DropReasonCode(200).to_string(), "200");
    }
}

//! Report sessions: where reports go and how they are encapsulated.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sonic_types::MacAddress;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{DtelError, Result};

/// Default UDP port telemetry collectors listen on.
pub const DEFAULT_REPORT_UDP_PORT: u16 = 32766;

fn default_udp_dst_port() -> u16 {
    DEFAULT_REPORT_UDP_PORT
}

fn default_ttl() -> u8 {
    64
}

/// How reports are spread over a session's destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// One destination per report, chosen by flow hash.
    #[default]
    LoadBalance,
    /// Every destination receives its own copy.
    Replicate,
}

/// UDP source port selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpSrcPortMode {
    Fixed(u16),
    /// Hash of the reported flow.
    Entropy,
}

/// Report session attributes as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSessionConfig {
    pub src_ip: Ipv4Addr,
    #[serde(default)]
    pub src_mac: MacAddress,
    /// Next-hop MAC toward the collectors.
    #[serde(default)]
    pub dst_mac: MacAddress,
    /// Collectors, in load-balance candidate order.
    pub dst_ips: Vec<Ipv4Addr>,
    #[serde(default = "default_udp_dst_port")]
    pub udp_dst_port: u16,
    #[serde(default)]
    pub udp_src_port: u16,
    #[serde(default)]
    pub udp_src_port_entropy: bool,
    #[serde(default = "default_ttl")]
    pub ttl: u8,
    #[serde(default)]
    pub tos: u8,
    /// Inner packet bytes kept in each report; 0 keeps everything.
    #[serde(default)]
    pub truncate_size: u16,
    #[serde(default)]
    pub distribution: DistributionMode,
}

impl ReportSessionConfig {
    pub fn new(src_ip: Ipv4Addr, dst_ips: Vec<Ipv4Addr>) -> Self {
        Self {
            src_ip,
            src_mac: MacAddress::ZERO,
            dst_mac: MacAddress::ZERO,
            dst_ips,
            udp_dst_port: DEFAULT_REPORT_UDP_PORT,
            udp_src_port: 0,
            udp_src_port_entropy: false,
            ttl: default_ttl(),
            tos: 0,
            truncate_size: 0,
            distribution: DistributionMode::default(),
        }
    }

    pub fn src_port_mode(&self) -> UdpSrcPortMode {
        if self.udp_src_port_entropy {
            UdpSrcPortMode::Entropy
        } else {
            UdpSrcPortMode::Fixed(self.udp_src_port)
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| DtelError::InvalidSession {
            name: name.to_string(),
            reason,
        };

        if self.dst_ips.is_empty() {
            return Err(invalid("at least one destination IP is required".to_string()));
        }

        let mut seen = HashSet::new();
        for ip in &self.dst_ips {
            if !seen.insert(ip) {
                return Err(invalid(format!("duplicate destination {}", ip)));
            }
            if ip.is_unspecified() || ip.is_multicast() || ip.is_broadcast() {
                return Err(invalid(format!("destination {} is not unicast", ip)));
            }
        }

        if self.ttl == 0 {
            return Err(invalid("ttl must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// One collector with its own sequence counter.
#[derive(Debug)]
pub struct Destination {
    ip: Ipv4Addr,
    next_sequence: Mutex<u32>,
}

impl Destination {
    fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            next_sequence: Mutex::new(0),
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Calls `send` with the next sequence number and advances the counter.
    ///
    /// The counter stays locked until `send` returns, so reports to one
    /// destination are handed off in sequence order. `send` must not block.
    pub fn sequenced<T>(&self, send: impl FnOnce(u32) -> T) -> T {
        let mut next = self.next_sequence.lock();
        let sequence = *next;
        *next = next.wrapping_add(1);
        send(sequence)
    }

    /// Returns the sequence number for the next report and advances it.
    pub fn take_sequence(&self) -> u32 {
        self.sequenced(|sequence| sequence)
    }

    /// Sequence number the next report will carry.
    pub fn peek_sequence(&self) -> u32 {
        *self.next_sequence.lock()
    }
}

/// An installed report session.
#[derive(Debug)]
pub struct ReportSession {
    name: String,
    config: ReportSessionConfig,
    destinations: Vec<Arc<Destination>>,
}

impl ReportSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ReportSessionConfig {
        &self.config
    }

    pub fn destinations(&self) -> &[Arc<Destination>] {
        &self.destinations
    }

    pub fn destination(&self, ip: Ipv4Addr) -> Option<&Arc<Destination>> {
        self.destinations.iter().find(|d| d.ip == ip)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<String, Arc<ReportSession>>,
    active: Option<String>,
}

/// Named report sessions and the one currently used for emission.
#[derive(Debug, Default)]
pub struct SessionTable {
    state: RwLock<SessionState>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a session.
    ///
    /// Destinations present before and after keep their sequence counters;
    /// newly added ones start at 0. The first session installed becomes
    /// active.
    #[instrument(skip(self, config))]
    pub fn upsert(&self, name: &str, config: ReportSessionConfig) -> Result<()> {
        config.validate(name)?;

        let mut state = self.state.write();
        let previous = state.sessions.get(name).cloned();
        let destinations = config
            .dst_ips
            .iter()
            .map(|ip| {
                previous
                    .as_ref()
                    .and_then(|s| s.destination(*ip).cloned())
                    .unwrap_or_else(|| Arc::new(Destination::new(*ip)))
            })
            .collect();

        info!(
            "{} report session {} ({} destinations)",
            if previous.is_some() { "Updating" } else { "Creating" },
            name,
            config.dst_ips.len()
        );

        state.sessions.insert(
            name.to_string(),
            Arc::new(ReportSession {
                name: name.to_string(),
                config,
                destinations,
            }),
        );
        if state.active.is_none() {
            state.active = Some(name.to_string());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.sessions.remove(name).is_none() {
            return Err(DtelError::SessionNotFound(name.to_string()));
        }
        if state.active.as_deref() == Some(name) {
            state.active = None;
        }
        info!("Removed report session {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_active(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(name) {
            return Err(DtelError::SessionNotFound(name.to_string()));
        }
        state.active = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ReportSession>> {
        self.state.read().sessions.get(name).cloned()
    }

    /// Session reports are currently emitted through.
    pub fn active(&self) -> Option<Arc<ReportSession>> {
        let state = self.state.read();
        state
            .active
            .as_ref()
            .and_then(|name| state.sessions.get(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(4, 4, 4, last)
    }

    fn config(dsts: &[u8]) -> ReportSessionConfig {
        ReportSessionConfig::new(ip(1), dsts.iter().map(|d| ip(*d)).collect())
    }

    #[test]
    fn test_first_session_becomes_active() {
        let table = SessionTable::new();
        assert!(table.active().is_none());
        table.upsert("s1", config(&[3])).unwrap();
        table.upsert("s2", config(&[4])).unwrap();
        assert_eq!(table.active().unwrap().name(), "s1");

        table.set_active("s2").unwrap();
        assert_eq!(table.active().unwrap().name(), "s2");
        assert!(table.set_active("nope").is_err());
    }

    #[test]
    fn test_retained_destination_keeps_sequence() {
        let table = SessionTable::new();
        table.upsert("s", config(&[3, 4])).unwrap();
        let session = table.active().unwrap();
        for _ in 0..5 {
            session.destination(ip(3)).unwrap().take_sequence();
        }
        session.destination(ip(4)).unwrap().take_sequence();

        // Drop 4, keep 3, add 5.
        table.upsert("s", config(&[3, 5])).unwrap();
        let session = table.active().unwrap();
        assert_eq!(session.destination(ip(3)).unwrap().peek_sequence(), 5);
        assert_eq!(session.destination(ip(5)).unwrap().peek_sequence(), 0);
        assert!(session.destination(ip(4)).is_none());

        // Re-adding 4 starts it from zero.
        table.upsert("s", config(&[3, 4, 5])).unwrap();
        let session = table.active().unwrap();
        assert_eq!(session.destination(ip(4)).unwrap().peek_sequence(), 0);
        let order: Vec<Ipv4Addr> = session.destinations().iter().map(|d| d.ip()).collect();
        assert_eq!(order, vec![ip(3), ip(4), ip(5)]);
    }

    #[test]
    fn test_validation() {
        let table = SessionTable::new();
        assert!(table.upsert("empty", config(&[])).is_err());
        assert!(table.upsert("dup", config(&[3, 3])).is_err());
        assert!(table
            .upsert(
                "mcast",
                ReportSessionConfig::new(ip(1), vec![Ipv4Addr::new(224, 0, 0, 1)])
            )
            .is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_active_session() {
        let table = SessionTable::new();
        table.upsert("s", config(&[3])).unwrap();
        table.remove("s").unwrap();
        assert!(table.active().is_none());
        assert_eq!(
            table.remove("s"),
            Err(DtelError::SessionNotFound("s".to_string()))
        );
    }

    #[test]
    fn test_src_port_mode() {
        let mut cfg = config(&[3]);
        cfg.udp_src_port = 1234;
        assert_eq!(cfg.src_port_mode(), UdpSrcPortMode::Fixed(1234));
        cfg.udp_src_port_entropy = true;
        assert_eq!(cfg.src_port_mode(), UdpSrcPortMode::Entropy);
    }
}

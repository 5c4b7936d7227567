//! Configuration file support for dteld
//!
//! Loads and validates dteld configuration from TOML files.
//! Default location: /etc/sonic/dteld.toml

use crate::error::{DteldError, Result};
use serde::{Deserialize, Serialize};
use sonic_dtel::{
    DropReasonCode, DtelEngine, DtelEventType, EngineConfig, EventSettings, QueueKey,
    QueueReportConfig, ReportSessionConfig, WatchRule,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/dteld.toml";

/// Daemon runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Pipeline worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Events buffered per worker before the reader waits
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,

    /// Statistics log interval in seconds, 0 disables
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Flow state clear cycle in milliseconds, 0 disables
    #[serde(default)]
    pub clear_cycle_ms: u64,

    /// Newline-delimited JSON event file; stdin when unset
    #[serde(default)]
    pub events: Option<PathBuf>,

    /// Local address reports are sent from
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Per event type enable and DSCP
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    #[serde(default)]
    pub flow_state: Option<EventSettings>,
    #[serde(default)]
    pub flow_report_all_packets: Option<EventSettings>,
    #[serde(default)]
    pub flow_tcp_flag: Option<EventSettings>,
    #[serde(default)]
    pub queue_report_threshold_breach: Option<EventSettings>,
    #[serde(default)]
    pub queue_report_tail_drop: Option<EventSettings>,
    #[serde(default)]
    pub drop_report: Option<EventSettings>,
}

impl EventsConfig {
    /// Configured entries only; absent event types keep engine defaults.
    pub fn entries(&self) -> Vec<(DtelEventType, EventSettings)> {
        [
            (DtelEventType::FlowState, self.flow_state),
            (DtelEventType::FlowReportAllPackets, self.flow_report_all_packets),
            (DtelEventType::FlowTcpFlag, self.flow_tcp_flag),
            (
                DtelEventType::QueueReportThresholdBreach,
                self.queue_report_threshold_breach,
            ),
            (DtelEventType::QueueReportTailDrop, self.queue_report_tail_drop),
            (DtelEventType::DropReport, self.drop_report),
        ]
        .into_iter()
        .filter_map(|(event, settings)| settings.map(|s| (event, s)))
        .collect()
    }
}

/// A named report session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub name: String,

    /// Emit through this session; at most one may be set
    #[serde(default)]
    pub active: bool,

    #[serde(flatten)]
    pub config: ReportSessionConfig,
}

/// Queue report attributes of one monitored queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReportEntry {
    pub port: u16,
    pub queue: u8,

    #[serde(flatten)]
    pub config: QueueReportConfig,
}

impl QueueReportEntry {
    pub fn key(&self) -> QueueKey {
        QueueKey::new(self.port, self.queue)
    }
}

/// Drop reason codes that never produce drop reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReasonsConfig {
    #[serde(default)]
    pub disabled: Vec<u8>,
}

/// Complete dteld configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DteldConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default, rename = "session")]
    pub sessions: Vec<SessionEntry>,

    #[serde(default, rename = "watch_rule")]
    pub watch_rules: Vec<WatchRule>,

    #[serde(default, rename = "queue_report")]
    pub queue_reports: Vec<QueueReportEntry>,

    #[serde(default)]
    pub drop_reasons: DropReasonsConfig,
}

// Default functions
fn default_workers() -> usize {
    4
}

fn default_channel_depth() -> usize {
    1024
}

fn default_stats_interval() -> u64 {
    30
}

fn default_bind_addr() -> String {
    "0.0.0.0:0".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            channel_depth: default_channel_depth(),
            stats_interval_secs: default_stats_interval(),
            clear_cycle_ms: 0,
            events: None,
            bind_addr: default_bind_addr(),
        }
    }
}

impl DteldConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                DteldError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DteldError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DteldError::Configuration(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DteldError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Clear cycle period, `None` when disabled
    pub fn clear_cycle(&self) -> Option<Duration> {
        (self.daemon.clear_cycle_ms > 0).then(|| Duration::from_millis(self.daemon.clear_cycle_ms))
    }

    /// Stats log period, `None` when disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.daemon.stats_interval_secs > 0)
            .then(|| Duration::from_secs(self.daemon.stats_interval_secs))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.daemon.workers == 0 {
            return Err(DteldError::Configuration("workers must be > 0".to_string()));
        }

        if self.daemon.channel_depth == 0 {
            return Err(DteldError::Configuration(
                "channel_depth must be > 0".to_string(),
            ));
        }

        if self.daemon.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(DteldError::Configuration(format!(
                "invalid bind_addr {}",
                self.daemon.bind_addr
            )));
        }

        if self.engine.suppression.capacity == 0 || self.engine.suppression.shards == 0 {
            return Err(DteldError::Configuration(
                "suppression capacity and shards must be > 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for session in &self.sessions {
            if !names.insert(session.name.as_str()) {
                return Err(DteldError::Configuration(format!(
                    "duplicate session {}",
                    session.name
                )));
            }
            session.config.validate(&session.name)?;
        }
        if self.sessions.iter().filter(|s| s.active).count() > 1 {
            return Err(DteldError::Configuration(
                "at most one session may be active".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for rule in &self.watch_rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(DteldError::Configuration(format!(
                    "duplicate watch rule {}",
                    rule.id
                )));
            }
            rule.validate()?;
        }

        let mut queues = HashSet::new();
        for entry in &self.queue_reports {
            if !queues.insert(entry.key()) {
                return Err(DteldError::Configuration(format!(
                    "duplicate queue report {}",
                    entry.key()
                )));
            }
        }

        Ok(())
    }

    /// Installs everything except `[engine]` into a running engine.
    pub fn apply(&self, engine: &DtelEngine) -> Result<()> {
        engine.set_latency_sensitivity(self.engine.latency_sensitivity);
        engine.set_tcp_flag_mask(self.engine.tcp_flag_mask);
        for (event, settings) in self.events.entries() {
            engine.set_event(event, settings)?;
        }

        for session in &self.sessions {
            engine
                .sessions()
                .upsert(&session.name, session.config.clone())?;
        }
        if let Some(active) = self.sessions.iter().find(|s| s.active) {
            engine.sessions().set_active(&active.name)?;
        }

        for rule in &self.watch_rules {
            engine.watchlist().add_rule(rule.clone())?;
        }

        for entry in &self.queue_reports {
            engine.queues().configure(entry.key(), entry.config);
        }

        for code in &self.drop_reasons.disabled {
            engine.drop_gate().set_enabled(DropReasonCode(*code), false);
        }

        info!(
            "Applied config: {} sessions, {} watch rules, {} monitored queues",
            self.sessions.len(),
            self.watch_rules.len(),
            self.queue_reports.len()
        );
        Ok(())
    }
}

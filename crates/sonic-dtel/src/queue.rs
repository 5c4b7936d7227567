//! Queue breach tracker.
//!
//! Per-queue thresholds plus a breach quota that bounds how many
//! queue-triggered reports a queue may produce before an explicit reset.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{DtelError, Result};
use crate::types::QueueKey;

fn unset_latency() -> u64 {
    u64::MAX
}

fn unset_depth() -> u32 {
    u32::MAX
}

fn is_unset_latency(ns: &u64) -> bool {
    *ns == u64::MAX
}

fn is_unset_depth(depth: &u32) -> bool {
    *depth == u32::MAX
}

/// Queue report attributes for one monitored queue.
///
/// A threshold of 0 is always exceeded. Unset thresholds never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReportConfig {
    #[serde(default = "unset_latency", skip_serializing_if = "is_unset_latency")]
    pub latency_threshold_ns: u64,
    #[serde(default = "unset_depth", skip_serializing_if = "is_unset_depth")]
    pub depth_threshold: u32,
    #[serde(default)]
    pub breach_quota: u32,
    #[serde(default)]
    pub tail_drop: bool,
}

impl Default for QueueReportConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ns: unset_latency(),
            depth_threshold: unset_depth(),
            breach_quota: 0,
            tail_drop: false,
        }
    }
}

/// Why a queue sample did or did not produce a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueVerdict {
    NotMonitored,
    NoBreach,
    QuotaExhausted,
    Report,
}

impl QueueVerdict {
    pub fn is_report(self) -> bool {
        self == QueueVerdict::Report
    }
}

/// Which queue events are globally enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueEventGates {
    pub threshold_breach: bool,
    pub tail_drop: bool,
}

#[derive(Debug)]
struct QueueState {
    config: QueueReportConfig,
    remaining_quota: AtomicU32,
}

/// Monitored queue table.
#[derive(Debug, Default)]
pub struct QueueBreachTracker {
    queues: DashMap<QueueKey, Arc<QueueState>>,
}

impl QueueBreachTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a queue report; the quota restarts at the
    /// configured value.
    #[instrument(skip(self))]
    pub fn configure(&self, key: QueueKey, config: QueueReportConfig) {
        info!("Queue report configured for {}", key);
        self.queues.insert(
            key,
            Arc::new(QueueState {
                config,
                remaining_quota: AtomicU32::new(config.breach_quota),
            }),
        );
    }

    #[instrument(skip(self))]
    pub fn remove(&self, key: QueueKey) -> Result<()> {
        self.queues
            .remove(&key)
            .map(|_| info!("Queue report removed for {}", key))
            .ok_or(DtelError::QueueNotMonitored(key))
    }

    /// Resets the remaining breach quota.
    #[instrument(skip(self))]
    pub fn reset_quota(&self, key: QueueKey, quota: u32) -> Result<()> {
        let state = self
            .queues
            .get(&key)
            .ok_or(DtelError::QueueNotMonitored(key))?;
        state.remaining_quota.store(quota, Ordering::Release);
        info!("Queue {} breach quota reset to {}", key, quota);
        Ok(())
    }

    pub fn remaining_quota(&self, key: QueueKey) -> Option<u32> {
        self.queues
            .get(&key)
            .map(|s| s.remaining_quota.load(Ordering::Acquire))
    }

    pub fn is_monitored(&self, key: QueueKey) -> bool {
        self.queues.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Checks one queue sample and consumes a unit of quota on a report.
    pub fn check_queue(
        &self,
        key: QueueKey,
        latency_ns: u64,
        depth: u32,
        is_tail_drop: bool,
        gates: QueueEventGates,
    ) -> QueueVerdict {
        let Some(state) = self.queues.get(&key).map(|s| Arc::clone(&s)) else {
            return QueueVerdict::NotMonitored;
        };
        let config = &state.config;

        let threshold_breach = gates.threshold_breach
            && (latency_ns >= config.latency_threshold_ns || depth >= config.depth_threshold);
        let tail_drop = gates.tail_drop && is_tail_drop && config.tail_drop;

        if !threshold_breach && !tail_drop {
            return QueueVerdict::NoBreach;
        }

        match state
            .remaining_quota
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| q.checked_sub(1))
        {
            Ok(previous) => {
                debug!(queue = %key, remaining = previous - 1, "Queue breach reported");
                QueueVerdict::Report
            }
            Err(_) => QueueVerdict::QuotaExhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: QueueEventGates = QueueEventGates {
        threshold_breach: true,
        tail_drop: true,
    };

    fn key() -> QueueKey {
        QueueKey::new(4, 0)
    }

    #[test]
    fn test_unmonitored_queue() {
        let tracker = QueueBreachTracker::new();
        assert_eq!(
            tracker.check_queue(key(), 1_000_000, 1000, false, ALL),
            QueueVerdict::NotMonitored
        );
        assert!(tracker.reset_quota(key(), 1).is_err());
        assert!(tracker.remove(key()).is_err());
    }

    #[test]
    fn test_quota_exhaustion_and_reset() {
        let tracker = QueueBreachTracker::new();
        tracker.configure(
            key(),
            QueueReportConfig {
                latency_threshold_ns: 0,
                breach_quota: 1,
                ..Default::default()
            },
        );

        assert!(tracker.check_queue(key(), 10, 0, false, ALL).is_report());
        assert_eq!(tracker.remaining_quota(key()), Some(0));
        assert_eq!(
            tracker.check_queue(key(), 10, 0, false, ALL),
            QueueVerdict::QuotaExhausted
        );

        tracker.reset_quota(key(), 3).unwrap();
        let reports = (0..10)
            .filter(|_| tracker.check_queue(key(), 10, 0, false, ALL).is_report())
            .count();
        assert_eq!(reports, 3);
    }

    #[test]
    fn test_thresholds() {
        let tracker = QueueBreachTracker::new();
        tracker.configure(
            key(),
            QueueReportConfig {
                latency_threshold_ns: 5000,
                depth_threshold: 100,
                breach_quota: 100,
                tail_drop: false,
            },
        );

        assert_eq!(
            tracker.check_queue(key(), 4999, 99, false, ALL),
            QueueVerdict::NoBreach
        );
        assert!(tracker.check_queue(key(), 5000, 0, false, ALL).is_report());
        assert!(tracker.check_queue(key(), 0, 100, false, ALL).is_report());
        // tail drop not enabled on this queue
        assert_eq!(
            tracker.check_queue(key(), 0, 0, true, ALL),
            QueueVerdict::NoBreach
        );
    }

    #[test]
    fn test_tail_drop_and_gates() {
        let tracker = QueueBreachTracker::new();
        tracker.configure(
            key(),
            QueueReportConfig {
                tail_drop: true,
                breach_quota: 10,
                ..Default::default()
            },
        );

        assert!(tracker.check_queue(key(), 0, 0, true, ALL).is_report());

        let no_tail = QueueEventGates {
            threshold_breach: true,
            tail_drop: false,
        };
        assert_eq!(
            tracker.check_queue(key(), 0, 0, true, no_tail),
            QueueVerdict::NoBreach
        );
    }

    #[test]
    fn test_zero_quota_never_reports() {
        let tracker = QueueBreachTracker::new();
        tracker.configure(
            key(),
            QueueReportConfig {
                latency_threshold_ns: 0,
                depth_threshold: 0,
                ..Default::default()
            },
        );
        assert_eq!(
            tracker.check_queue(key(), u64::MAX, u32::MAX, true, ALL),
            QueueVerdict::QuotaExhausted
        );
    }

    #[test]
    fn test_reconfigure_restores_quota() {
        let tracker = QueueBreachTracker::new();
        let cfg = QueueReportConfig {
            depth_threshold: 0,
            breach_quota: 1,
            ..Default::default()
        };
        tracker.configure(key(), cfg);
        tracker.check_queue(key(), 0, 0, false, ALL);
        assert_eq!(tracker.remaining_quota(key()), Some(0));

        tracker.configure(key(), cfg);
        assert_eq!(tracker.remaining_quota(key()), Some(1));
    }
}

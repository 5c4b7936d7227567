//! Engine counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::report::ReportKind;

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DtelStats {
    pub events_processed: u64,
    pub events_not_watched: u64,
    pub postcard_reports: u64,
    pub drop_reports: u64,
    pub tail_drop_reports: u64,
    pub flow_reports_suppressed: u64,
    pub drop_reports_gated: u64,
    pub queue_reports_over_quota: u64,
    pub reports_without_session: u64,
    pub transmit_failures: u64,
    pub packets_truncated: u64,
}

impl DtelStats {
    /// Reports handed to the transport, all kinds.
    pub fn reports_sent(&self) -> u64 {
        self.postcard_reports + self.drop_reports + self.tail_drop_reports
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    events_processed: AtomicU64,
    events_not_watched: AtomicU64,
    postcard_reports: AtomicU64,
    drop_reports: AtomicU64,
    tail_drop_reports: AtomicU64,
    flow_reports_suppressed: AtomicU64,
    drop_reports_gated: AtomicU64,
    queue_reports_over_quota: AtomicU64,
    reports_without_session: AtomicU64,
    transmit_failures: AtomicU64,
    packets_truncated: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl StatsCounters {
    pub fn event(&self) {
        bump(&self.events_processed, 1);
    }

    pub fn not_watched(&self) {
        bump(&self.events_not_watched, 1);
    }

    pub fn suppressed(&self) {
        bump(&self.flow_reports_suppressed, 1);
    }

    pub fn gated(&self) {
        bump(&self.drop_reports_gated, 1);
    }

    pub fn over_quota(&self) {
        bump(&self.queue_reports_over_quota, 1);
    }

    pub fn no_session(&self) {
        bump(&self.reports_without_session, 1);
    }

    pub fn truncated(&self) {
        bump(&self.packets_truncated, 1);
    }

    pub fn sent(&self, kind: ReportKind, copies: u32) {
        let counter = match kind {
            ReportKind::Postcard => &self.postcard_reports,
            ReportKind::Mod => &self.drop_reports,
            ReportKind::TailDrop => &self.tail_drop_reports,
        };
        bump(counter, u64::from(copies));
    }

    pub fn failed(&self, copies: u32) {
        bump(&self.transmit_failures, u64::from(copies));
    }

    pub fn snapshot(&self) -> DtelStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DtelStats {
            events_processed: load(&self.events_processed),
            events_not_watched: load(&self.events_not_watched),
            postcard_reports: load(&self.postcard_reports),
            drop_reports: load(&self.drop_reports),
            tail_drop_reports: load(&self.tail_drop_reports),
            flow_reports_suppressed: load(&self.flow_reports_suppressed),
            drop_reports_gated: load(&self.drop_reports_gated),
            queue_reports_over_quota: load(&self.queue_reports_over_quota),
            reports_without_session: load(&self.reports_without_session),
            transmit_failures: load(&self.transmit_failures),
            packets_truncated: load(&self.packets_truncated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_by_kind() {
        let counters = StatsCounters::default();
        counters.event();
        counters.sent(ReportKind::Postcard, 2);
        counters.sent(ReportKind::Mod, 1);
        counters.failed(1);

        let stats = counters.snapshot();
        assert_eq!(stats.events_processed, 1);
        assert_eq!(stats.postcard_reports, 2);
        assert_eq!(stats.drop_reports, 1);
        assert_eq!(stats.reports_sent(), 3);
        assert_eq!(stats.transmit_failures, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let json = serde_json::to_value(DtelStats::default()).unwrap();
        assert_eq!(json["flow_reports_suppressed"], 0);
    }
}

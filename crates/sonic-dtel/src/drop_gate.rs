//! Per-drop-reason report filter.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::types::DropReasonCode;

/// Drop reason gate.
///
/// Every code is admitted until explicitly disabled. Toggles are single
/// atomic stores, visible to the next packet processed.
#[derive(Debug)]
pub struct DropReasonGate {
    disabled: Box<[AtomicBool]>,
}

impl Default for DropReasonGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DropReasonGate {
    pub fn new() -> Self {
        Self {
            disabled: (0..=u8::MAX).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Returns true if drops with this reason may generate reports.
    pub fn admit_drop(&self, reason: DropReasonCode) -> bool {
        !self.disabled[usize::from(reason.code())].load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, reason: DropReasonCode, enabled: bool) {
        let was_disabled =
            self.disabled[usize::from(reason.code())].swap(!enabled, Ordering::AcqRel);
        if was_disabled == enabled {
            info!(
                "Drop reason {} reporting {}",
                reason,
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    /// Codes currently excluded from reporting.
    pub fn disabled_reasons(&self) -> Vec<DropReasonCode> {
        self.disabled
            .iter()
            .enumerate()
            .filter(|(_, flag)| flag.load(Ordering::Acquire))
            .filter_map(|(code, _)| u8::try_from(code).ok().map(DropReasonCode))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_admits_by_default() {
        let gate = DropReasonGate::new();
        assert!(gate.admit_drop(DropReasonCode::ACL_DENY));
        assert!(gate.admit_drop(DropReasonCode(255)));
        assert!(gate.disabled_reasons().is_empty());
    }

    #[test]
    fn test_toggle_is_immediate_and_stateless() {
        let gate = DropReasonGate::new();
        gate.set_enabled(DropReasonCode::OUTER_IP_TTL_ZERO, false);
        assert!(!gate.admit_drop(DropReasonCode::OUTER_IP_TTL_ZERO));
        assert!(gate.admit_drop(DropReasonCode::ACL_DENY));
        assert_eq!(
            gate.disabled_reasons(),
            vec![DropReasonCode::OUTER_IP_TTL_ZERO]
        );

        gate.set_enabled(DropReasonCode::OUTER_IP_TTL_ZERO, true);
        assert!(gate.admit_drop(DropReasonCode::OUTER_IP_TTL_ZERO));
        assert!(gate.disabled_reasons().is_empty());
    }
}

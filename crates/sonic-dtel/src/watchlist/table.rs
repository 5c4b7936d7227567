//! Watchlist rule store and classifier.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::rule::WatchRule;
use crate::error::{DtelError, Result};
use crate::event::PacketEvent;
use crate::types::{BindPoint, Direction, ReportTypeMask};

/// Result of classifying one packet event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub report_types: ReportTypeMask,
    pub report_all_packets: bool,
}

impl Classification {
    pub const NONE: Classification = Classification {
        report_types: ReportTypeMask::NONE,
        report_all_packets: false,
    };

    fn from_rule(rule: &WatchRule) -> Self {
        Self {
            report_types: rule.report_types,
            report_all_packets: rule.report_all_packets,
        }
    }

    fn merge(self, other: Classification) -> Classification {
        Classification {
            report_types: self.report_types | other.report_types,
            report_all_packets: self.report_all_packets || other.report_all_packets,
        }
    }

    pub fn requests(&self, report_type: ReportTypeMask) -> bool {
        self.report_types.contains(report_type)
    }
}

/// Rules grouped by (direction, bind point), each group sorted by
/// precedence. Rebuilt on every configuration change.
#[derive(Debug, Default)]
struct CompiledRules {
    groups: HashMap<(Direction, BindPoint), Vec<Arc<WatchRule>>>,
}

impl CompiledRules {
    fn build(rules: &HashMap<String, Arc<WatchRule>>) -> Self {
        let mut groups: HashMap<(Direction, BindPoint), Vec<Arc<WatchRule>>> = HashMap::new();
        for rule in rules.values() {
            groups
                .entry((rule.direction, rule.bind_point))
                .or_default()
                .push(Arc::clone(rule));
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| a.precedence(b));
        }
        Self { groups }
    }

    fn first_match(
        &self,
        direction: Direction,
        bind_point: BindPoint,
        event: &PacketEvent,
    ) -> Option<&WatchRule> {
        self.groups
            .get(&(direction, bind_point))?
            .iter()
            .find(|rule| rule.key.matches(event))
            .map(Arc::as_ref)
    }
}

/// The DTEL watchlist.
///
/// Configuration calls take a write lock and rebuild the compiled view;
/// classification only clones the current compiled view, so packet
/// processing never waits on a rebuild.
#[derive(Debug, Default)]
pub struct Watchlist {
    rules: RwLock<HashMap<String, Arc<WatchRule>>>,
    compiled: RwLock<Arc<CompiledRules>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new rule.
    #[instrument(skip(self, rule), fields(rule = %rule.id))]
    pub fn add_rule(&self, rule: WatchRule) -> Result<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(DtelError::RuleExists(rule.id));
        }
        info!("Adding watch rule {}", rule);
        rules.insert(rule.id.clone(), Arc::new(rule));
        self.recompile(&rules);
        Ok(())
    }

    /// Replaces an installed rule with the same ID.
    #[instrument(skip(self, rule), fields(rule = %rule.id))]
    pub fn update_rule(&self, rule: WatchRule) -> Result<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        if !rules.contains_key(&rule.id) {
            return Err(DtelError::RuleNotFound(rule.id));
        }
        info!("Updating watch rule {}", rule);
        rules.insert(rule.id.clone(), Arc::new(rule));
        self.recompile(&rules);
        Ok(())
    }

    /// Removes a rule by ID.
    #[instrument(skip(self))]
    pub fn remove_rule(&self, id: &str) -> Result<()> {
        let mut rules = self.rules.write();
        if rules.remove(id).is_none() {
            return Err(DtelError::RuleNotFound(id.to_string()));
        }
        info!("Removed watch rule {}", id);
        self.recompile(&rules);
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Option<Arc<WatchRule>> {
        self.rules.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    fn recompile(&self, rules: &HashMap<String, Arc<WatchRule>>) {
        let compiled = Arc::new(CompiledRules::build(rules));
        *self.compiled.write() = compiled;
    }

    /// Classifies an event in both directions and merges the results.
    ///
    /// Egress rules are only consulted when the packet has an egress port.
    pub fn classify(&self, event: &PacketEvent) -> Classification {
        let compiled = Arc::clone(&self.compiled.read());

        let ingress = Self::classify_direction(&compiled, Direction::Ingress, event);
        let egress = match event.egress_port {
            Some(_) => Self::classify_direction(&compiled, Direction::Egress, event),
            None => Classification::NONE,
        };

        ingress.merge(egress)
    }

    /// Winning rule for one direction: the narrowest bind point with any
    /// matching rule decides; within it, the first rule in precedence order.
    fn classify_direction(
        compiled: &CompiledRules,
        direction: Direction,
        event: &PacketEvent,
    ) -> Classification {
        let port = match direction {
            Direction::Ingress => Some(event.ingress_port),
            Direction::Egress => event.egress_port,
        };

        let scopes = [
            port.map(BindPoint::Port),
            event.lag_id.map(BindPoint::Lag),
            event.vlan_id.map(BindPoint::Vlan),
            Some(BindPoint::Switch),
        ];

        for scope in scopes.into_iter().flatten() {
            if let Some(rule) = compiled.first_match(direction, scope, event) {
                debug!(rule = %rule.id, %direction, "Watch rule matched");
                return Classification::from_rule(rule);
            }
        }

        Classification::NONE
    }
}

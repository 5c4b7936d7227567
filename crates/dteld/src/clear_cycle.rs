//! Periodic flow state clear cycle.

use sonic_dtel::DtelEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Advances the engine epoch every `period` until stopped or dropped.
#[derive(Debug)]
pub struct ClearCycle {
    engine: Arc<DtelEngine>,
    period: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ClearCycle {
    /// `None` or a zero period leaves the cycle stopped.
    pub fn new(engine: Arc<DtelEngine>, period: Option<Duration>) -> Self {
        let mut cycle = Self {
            engine,
            period: None,
            task: None,
        };
        cycle.set_period(period);
        cycle
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Restarts the cycle with a new period; `None` or zero stops it.
    pub fn set_period(&mut self, period: Option<Duration>) {
        self.stop();
        let Some(period) = period.filter(|p| !p.is_zero()) else {
            info!("Flow state clear cycle disabled");
            return;
        };

        info!("Flow state clear cycle every {:?}", period);
        let engine = Arc::clone(&self.engine);
        self.period = Some(period);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let epoch = engine.advance_epoch();
                debug!(epoch, "Cleared flow state");
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.period = None;
    }
}

impl Drop for ClearCycle {
    fn drop(&mut self) {
        self.stop();
    }
}

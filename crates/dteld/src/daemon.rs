//! Main daemon loop: event input, dispatch, periodic tasks, shutdown.

use sonic_dtel::{DtelEngine, DtelStats};
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

use crate::clear_cycle::ClearCycle;
use crate::config_file::DteldConfig;
use crate::error::Result;
use crate::source::EventReader;
use crate::worker::WorkerPool;

/// Feeds every event from `reader` through the engine until end of input
/// or `shutdown` completes, then drains the workers and returns the final
/// engine statistics.
pub async fn run<R, S>(
    engine: Arc<DtelEngine>,
    config: &DteldConfig,
    mut reader: EventReader<R>,
    shutdown: S,
) -> Result<DtelStats>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let pool = WorkerPool::spawn(
        Arc::clone(&engine),
        config.daemon.workers,
        config.daemon.channel_depth,
    );
    let _clear_cycle = ClearCycle::new(Arc::clone(&engine), config.clear_cycle());
    let mut stats_ticker = config.stats_interval().map(|period| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    tokio::pin!(shutdown);
    let mut dispatched: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = tick(&mut stats_ticker) => log_stats(&engine.stats()),
            next = reader.next_event() => match next? {
                Some(event) => {
                    pool.dispatch(event).await?;
                    dispatched += 1;
                }
                None => {
                    info!("End of event input after {} events", dispatched);
                    break;
                }
            },
        }
    }

    let summary = pool.shutdown().await;
    let stats = engine.stats();
    info!(
        processed = summary.processed,
        reported = summary.reported,
        skipped_lines = reader.skipped(),
        "Workers drained"
    );
    log_stats(&stats);
    Ok(stats)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_stats(stats: &DtelStats) {
    info!(
        events = stats.events_processed,
        reports = stats.reports_sent(),
        suppressed = stats.flow_reports_suppressed,
        gated = stats.drop_reports_gated,
        over_quota = stats.queue_reports_over_quota,
        transmit_failures = stats.transmit_failures,
        "DTEL stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_dtel::CaptureSink;

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let engine = Arc::new(DtelEngine::new(
            Default::default(),
            Arc::new(CaptureSink::new()),
        ));
        // stdin-like reader that never yields a line.
        let (_writer, pipe) = tokio::io::duplex(64);
        let reader = EventReader::new(tokio::io::BufReader::new(pipe));

        let stats = run(engine, &DteldConfig::default(), reader, async {})
            .await
            .unwrap();
        assert_eq!(stats.events_processed, 0);
    }
}

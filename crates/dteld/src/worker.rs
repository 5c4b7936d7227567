//! Pipeline worker pool.
//!
//! Events are routed by ingress port so every port's events are processed
//! in arrival order by the same worker.

use sonic_dtel::{DtelEngine, PacketEvent, ProcessOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{DteldError, Result};

/// Per-worker totals returned on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSummary {
    pub processed: u64,
    pub reported: u64,
}

/// Fixed set of tasks running `DtelEngine::process`.
#[derive(Debug)]
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<PacketEvent>>,
    handles: Vec<JoinHandle<WorkerSummary>>,
}

impl WorkerPool {
    pub fn spawn(engine: Arc<DtelEngine>, workers: usize, channel_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let (tx, rx) = mpsc::channel(channel_depth.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(id, Arc::clone(&engine), rx)));
        }

        info!("Started {} pipeline workers", workers);
        Self { senders, handles }
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Worker responsible for an ingress port.
    pub fn worker_for(&self, ingress_port: u16) -> usize {
        usize::from(ingress_port) % self.senders.len()
    }

    /// Queues an event, waiting while the worker's channel is full.
    pub async fn dispatch(&self, event: PacketEvent) -> Result<()> {
        let id = self.worker_for(event.ingress_port);
        self.senders[id]
            .send(event)
            .await
            .map_err(|_| DteldError::WorkerStopped(id))
    }

    /// Closes the channels and waits for queued events to drain.
    pub async fn shutdown(self) -> WorkerSummary {
        drop(self.senders);

        let mut total = WorkerSummary::default();
        for (id, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(summary) => {
                    total.processed += summary.processed;
                    total.reported += summary.reported;
                }
                Err(e) => debug!("Worker {} ended abnormally: {}", id, e),
            }
        }
        total
    }
}

async fn run_worker(
    id: usize,
    engine: Arc<DtelEngine>,
    mut rx: mpsc::Receiver<PacketEvent>,
) -> WorkerSummary {
    let mut summary = WorkerSummary::default();
    while let Some(event) = rx.recv().await {
        summary.processed += 1;
        if let ProcessOutcome::Reported { .. } = engine.process(&event) {
            summary.reported += 1;
        }
    }
    debug!(worker = id, processed = summary.processed, "Worker stopped");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder};
    use pretty_assertions::assert_eq;
    use sonic_dtel::report::wire::OUTER_HEADER_LEN;
    use sonic_dtel::{
        CaptureSink, EngineConfig, MatchKey, ReportSessionConfig, ReportTypeMask, WatchRule,
    };
    use std::net::Ipv4Addr;

    fn engine(sink: Arc<CaptureSink>) -> Arc<DtelEngine> {
        let engine = DtelEngine::new(EngineConfig::default(), sink);
        engine
            .sessions()
            .upsert(
                "s",
                ReportSessionConfig::new(Ipv4Addr::new(1, 1, 1, 1), vec![Ipv4Addr::new(2, 2, 2, 2)]),
            )
            .unwrap();
        engine
            .watchlist()
            .add_rule(WatchRule::new("all", 1, MatchKey::default(), ReportTypeMask::FLOW))
            .unwrap();
        Arc::new(engine)
    }

    fn event(port: u16, l4_src_port: u16) -> PacketEvent {
        let mut event: PacketEvent = serde_json::from_str(r#"{"ingress_port": 0}"#).unwrap();
        event.ingress_port = port;
        event.egress_port = Some(10);
        event.ip_protocol = 17;
        event.l4_src_port = l4_src_port;
        event
    }

    #[tokio::test]
    async fn test_routes_by_ingress_port() {
        let pool = WorkerPool::spawn(engine(Arc::new(CaptureSink::new())), 4, 8);
        assert_eq!(pool.workers(), 4);
        assert_eq!(pool.worker_for(1), 1);
        assert_eq!(pool.worker_for(6), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_drains_on_shutdown() {
        let sink = Arc::new(CaptureSink::new());
        let pool = WorkerPool::spawn(engine(sink.clone()), 3, 2);

        for i in 0..30u16 {
            pool.dispatch(event(i % 5, i)).await.unwrap();
        }
        // Repeats of the same flow are suppressed.
        for _ in 0..10 {
            pool.dispatch(event(0, 0)).await.unwrap();
        }

        let summary = pool.shutdown().await;
        assert_eq!(summary.processed, 40);
        assert_eq!(summary.reported, 30);
        assert_eq!(sink.len(), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_workers_share_sequence_space() {
        let sink = Arc::new(CaptureSink::new());
        let pool = WorkerPool::spawn(engine(sink.clone()), 4, 16);

        for i in 0..400u16 {
            pool.dispatch(event(i % 8, i)).await.unwrap();
        }
        let summary = pool.shutdown().await;
        assert_eq!(summary.reported, 400);

        let sequences: Vec<u32> = sink
            .take()
            .iter()
            .map(|r| BigEndian::read_u32(&r.frame[OUTER_HEADER_LEN..]) & 0x003f_ffff)
            .collect();
        assert_eq!(sequences, (0..400).collect::<Vec<u32>>());
    }
}

//! Concurrency tests for shared engine state
//!
//! Several threads drive one `DtelEngine`, the way the daemon's workers do:
//! - One FLOW report per flow per epoch
//! - Queue breach quota never overshoots
//! - Gap-free, in-order sequence numbers per destination

use byteorder::{BigEndian, ByteOrder};
use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use std::sync::Arc;

use sonic_dtel::report::wire::OUTER_HEADER_LEN;
use sonic_dtel::{
    CaptureSink, DtelEngine, EngineConfig, MatchKey, PacketEvent, QueueKey, QueueReportConfig,
    ReportSessionConfig, ReportTypeMask, WatchRule,
};

const THREADS: u16 = 8;
const PER_THREAD: u16 = 200;
const TOTAL: usize = THREADS as usize * PER_THREAD as usize;

fn engine() -> (DtelEngine, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::new());
    let engine = DtelEngine::new(EngineConfig::default(), sink.clone());
    engine
        .sessions()
        .upsert(
            "dtel",
            ReportSessionConfig::new(Ipv4Addr::new(4, 4, 4, 1), vec![Ipv4Addr::new(4, 4, 4, 3)]),
        )
        .expect("Failed to create session");
    (engine, sink)
}

fn packet(src_port: u16) -> PacketEvent {
    serde_json::from_value(serde_json::json!({
        "ingress_port": 1,
        "egress_port": 2,
        "ingress_timestamp_ns": 10_000,
        "egress_timestamp_ns": 10_400,
        "src_ip": "10.0.0.1",
        "dst_ip": "10.10.10.1",
        "ip_protocol": 17,
        "l4_src_port": src_port,
        "l4_dst_port": 4791,
        "packet": vec![0x5a_u8; 64],
    }))
    .expect("valid event")
}

/// Processes `event(thread, i)` from `THREADS` threads and counts the
/// events that produced a report.
fn hammer(engine: &DtelEngine, event: impl Fn(u16, u16) -> PacketEvent + Sync) -> usize {
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let event = &event;
                s.spawn(move || {
                    (0..PER_THREAD)
                        .filter(|&i| engine.process(&event(t, i)).is_reported())
                        .count()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .sum()
    })
}

#[test]
fn test_one_flow_report_per_epoch_under_contention() {
    let (engine, sink) = engine();
    engine
        .watchlist()
        .add_rule(WatchRule::new("all", 10, MatchKey::default(), ReportTypeMask::FLOW))
        .unwrap();

    assert_eq!(hammer(&engine, |_, _| packet(5000)), 1);
    assert_eq!(sink.take().len(), 1);
    assert_eq!(engine.stats().flow_reports_suppressed, TOTAL as u64 - 1);

    engine.advance_epoch();
    assert_eq!(hammer(&engine, |_, _| packet(5000)), 1);
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_queue_quota_exact_under_contention() {
    let (engine, sink) = engine();
    engine.queues().configure(
        QueueKey::new(2, 0),
        QueueReportConfig {
            latency_threshold_ns: 0,
            breach_quota: 5,
            ..Default::default()
        },
    );

    assert_eq!(hammer(&engine, |t, i| packet(t * PER_THREAD + i)), 5);
    assert_eq!(sink.len(), 5);
    assert_eq!(engine.stats().queue_reports_over_quota, TOTAL as u64 - 5);
}

#[test]
fn test_sequence_numbers_gap_free_under_contention() {
    let (engine, sink) = engine();
    engine
        .watchlist()
        .add_rule(
            WatchRule::new("all", 10, MatchKey::default(), ReportTypeMask::FLOW)
                .with_report_all_packets(true),
        )
        .unwrap();

    assert_eq!(hammer(&engine, |t, i| packet(t * PER_THREAD + i)), TOTAL);

    let delivered: Vec<u32> = sink
        .take()
        .iter()
        .map(|r| BigEndian::read_u32(&r.frame[OUTER_HEADER_LEN..]) & 0x003f_ffff)
        .collect();
    let expected: Vec<u32> = (0..TOTAL as u32).collect();
    assert_eq!(delivered, expected);
}

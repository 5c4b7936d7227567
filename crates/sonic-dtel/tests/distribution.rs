//! Integration tests for report distribution across collectors
//!
//! - Load balancing across destinations
//! - UDP source port entropy and per-flow stability

use byteorder::{BigEndian, ByteOrder};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use sonic_dtel::report::wire::UDP_SRC_PORT_OFFSET;
use sonic_dtel::{
    CaptureSink, DistributionMode, DtelEngine, EngineConfig, MatchKey, PacketEvent,
    ReportSessionConfig, ReportTypeMask, WatchRule,
};

fn collectors(n: u8) -> Vec<Ipv4Addr> {
    (1..=n).map(|i| Ipv4Addr::new(192, 168, 100, i)).collect()
}

fn engine(session: ReportSessionConfig) -> (DtelEngine, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::new());
    let engine = DtelEngine::new(EngineConfig::default(), sink.clone());
    engine.sessions().upsert("dtel", session).unwrap();
    engine
        .watchlist()
        .add_rule(WatchRule::new(
            "all",
            100,
            MatchKey::default(),
            ReportTypeMask::FLOW,
        ))
        .unwrap();
    (engine, sink)
}

fn flow(i: u32) -> PacketEvent {
    serde_json::from_value(serde_json::json!({
        "ingress_port": 1 + (i % 4),
        "egress_port": 9,
        "src_ip": Ipv4Addr::from(0x0a00_0000 + i).to_string(),
        "dst_ip": "172.16.0.1",
        "ip_protocol": 6,
        "l4_src_port": 1024 + (i % 50_000),
        "l4_dst_port": 443,
        "packet": vec![0u8; 64],
    }))
    .expect("valid event")
}

#[test]
fn test_load_balance_within_half_of_uniform_share() {
    let dsts = collectors(4);
    let (engine, sink) = engine(ReportSessionConfig::new(
        Ipv4Addr::new(192, 168, 0, 1),
        dsts.clone(),
    ));

    let flows = 2000;
    for i in 0..flows {
        engine.process(&flow(i));
    }
    assert_eq!(sink.len(), flows as usize);

    let expected = f64::from(flows) / dsts.len() as f64;
    for ip in dsts {
        let got = sink.sent_to(ip) as f64;
        assert!(
            (got - expected).abs() <= expected * 0.5,
            "{} received {} reports, expected about {}",
            ip,
            got,
            expected
        );
    }
}

#[test]
fn test_replicate_gives_every_collector_a_copy() {
    let dsts = collectors(3);
    let mut cfg = ReportSessionConfig::new(Ipv4Addr::new(192, 168, 0, 1), dsts.clone());
    cfg.distribution = DistributionMode::Replicate;
    let (engine, sink) = engine(cfg);

    for i in 0..10 {
        engine.process(&flow(i));
    }
    for ip in dsts {
        assert_eq!(sink.sent_to(ip), 10);
    }
}

#[test]
fn test_entropy_source_ports_are_distinct_and_stable() {
    let mut cfg = ReportSessionConfig::new(Ipv4Addr::new(192, 168, 0, 1), collectors(1));
    cfg.udp_src_port_entropy = true;
    let (engine, sink) = engine(cfg);

    let flows = 200u32;
    for i in 0..flows {
        engine.process(&flow(i));
    }
    let ports: Vec<u16> = sink
        .take()
        .iter()
        .map(|r| BigEndian::read_u16(&r.frame[UDP_SRC_PORT_OFFSET..]))
        .collect();
    assert_eq!(ports.len(), flows as usize);
    let distinct: HashSet<u16> = ports.iter().copied().collect();
    assert!(
        distinct.len() * 100 >= ports.len() * 80,
        "only {} distinct ports out of {}",
        distinct.len(),
        ports.len()
    );

    // The same flow keeps its port across clear cycles.
    let mut seen: HashMap<u32, u16> = HashMap::new();
    for _ in 0..3 {
        engine.advance_epoch();
        for i in 0..5 {
            engine.process(&flow(i));
            let port = BigEndian::read_u16(&sink.take()[0].frame[UDP_SRC_PORT_OFFSET..]);
            assert_eq!(*seen.entry(i).or_insert(port), port);
            assert_eq!(port, ports[i as usize]);
        }
    }
}

#[test]
fn test_fixed_source_port() {
    let mut cfg = ReportSessionConfig::new(Ipv4Addr::new(192, 168, 0, 1), collectors(1));
    cfg.udp_src_port = 5555;
    let (engine, sink) = engine(cfg);
    for i in 0..20 {
        engine.process(&flow(i));
    }
    assert!(sink
        .take()
        .iter()
        .all(|r| BigEndian::read_u16(&r.frame[UDP_SRC_PORT_OFFSET..]) == 5555));
}

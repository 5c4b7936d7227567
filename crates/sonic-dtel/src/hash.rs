//! Deterministic flow hashing.
//!
//! Every digest uses fixed seeds so a flow maps to the same suppression
//! slot, UDP source port and collector for the lifetime of the process.

use ahash::RandomState;
use once_cell::sync::Lazy;
use std::hash::{BuildHasher, Hash};

use crate::event::FlowKey;

static FLOW_STATE: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
});

static PATH_STATE: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x4528_21e6_38d0_1377,
        0xbe54_66cf_34e9_0c6c,
        0xc0ac_29b7_c97c_50dd,
        0x3f84_d5b5_b547_0917,
    )
});

static ENTROPY_STATE: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x9216_d5d9_8979_fb1b,
        0xd131_0ba6_98df_b5ac,
        0x2ffd_72db_d01a_dfb7,
        0xb8e1_afed_6a26_7e96,
    )
});

static BALANCE_STATE: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0xba7c_9045_f12c_7f99,
        0x24a1_9947_b391_6cf7,
        0x0801_f2e2_858e_fc16,
        0x6369_20d8_7157_1c33,
    )
});

/// Suppression-table digest of a flow.
pub fn flow_digest(flow: &FlowKey) -> u64 {
    FLOW_STATE.hash_one(flow)
}

/// Digest of the local forwarding path (ingress port, egress port, queue).
pub fn path_digest(ingress_port: u16, egress_port: Option<u16>, queue_id: u8) -> u32 {
    let h = PATH_STATE.hash_one((ingress_port, egress_port, queue_id));
    (h ^ (h >> 32)) as u32
}

/// UDP source port for entropy mode: stable per flow, dispersed across flows.
pub fn entropy_port(flow: &FlowKey) -> u16 {
    let h = ENTROPY_STATE.hash_one(flow);
    let folded = (h ^ (h >> 16) ^ (h >> 32) ^ (h >> 48)) as u16;
    folded.max(1)
}

/// Index of the destination a flow's reports are balanced onto.
pub fn balance_index(flow: &FlowKey, destinations: usize) -> usize {
    if destinations <= 1 {
        return 0;
    }
    (BALANCE_STATE.hash_one(flow) % destinations as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};

    fn flow(i: u32) -> FlowKey {
        FlowKey {
            ingress_port: 1,
            src_ip: IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)),
            ip_protocol: 6,
            l4_src_port: 1234,
            l4_dst_port: 80,
            vni: None,
        }
    }

    #[test]
    fn test_entropy_port_is_stable() {
        let f = flow(7);
        assert_eq!(entropy_port(&f), entropy_port(&f));
        assert_ne!(entropy_port(&f), 0);
    }

    #[test]
    fn test_entropy_port_disperses() {
        let ports: HashSet<u16> = (0..200).map(|i| entropy_port(&flow(i))).collect();
        assert!(ports.len() >= 160, "only {} distinct ports", ports.len());
    }

    #[test]
    fn test_vni_changes_digest() {
        let plain = flow(1);
        let tunneled = FlowKey {
            vni: Some(5000),
            ..plain
        };
        assert_ne!(flow_digest(&plain), flow_digest(&tunneled));
    }

    #[test]
    fn test_balance_index_in_range() {
        for i in 0..100 {
            assert!(balance_index(&flow(i), 3) < 3);
        }
        assert_eq!(balance_index(&flow(1), 0), 0);
    }
}

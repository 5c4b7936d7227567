//! Flow suppression cache.
//!
//! A fixed-capacity, sharded digest table standing in for the hardware
//! flow-state bloom filter. Each slot remembers the last reported path and
//! latency bucket of whichever flow hashed there, stamped with the epoch it
//! was written in. Advancing the epoch invalidates every slot lazily.
//!
//! Collision semantics are chosen by [`CollisionPolicy`]:
//!
//! - `Evict`: slots carry the full 64-bit flow digest. A foreign flow
//!   landing on an occupied slot reports and takes the slot over, so
//!   saturation causes duplicate reports, never missed ones.
//! - `Alias`: slots carry no flow identity. Flows sharing a slot and a
//!   path/latency bucket suppress each other, which reproduces the
//!   "missed reports at scale" behavior of a real bloom filter.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::event::FlowKey;
use crate::hash::flow_digest;

/// What happens when two flows hash to the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    #[default]
    Evict,
    Alias,
}

fn default_capacity() -> usize {
    65536
}

fn default_shards() -> usize {
    64
}

/// Suppression table sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Total slots, rounded up to a multiple of `shards`.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            shards: default_shards(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SuppressionEntry {
    flow_tag: u64,
    path_digest: u32,
    latency_bucket: u32,
    epoch: u64,
}

/// Quantizes hop latency into a bucket: `latency >> sensitivity`.
///
/// Lower sensitivity means narrower buckets and more reports for flows
/// whose latency fluctuates.
pub fn latency_bucket(latency_ns: u64, sensitivity: u8) -> u32 {
    let shifted = latency_ns.checked_shr(u32::from(sensitivity)).unwrap_or(0);
    u32::try_from(shifted).unwrap_or(u32::MAX)
}

/// Sharded flow suppression table.
#[derive(Debug)]
pub struct FlowSuppressionCache {
    shards: Box<[Mutex<Box<[Option<SuppressionEntry>]>>]>,
    slots_per_shard: usize,
    policy: CollisionPolicy,
    epoch: AtomicU64,
}

impl FlowSuppressionCache {
    pub fn new(config: SuppressionConfig) -> Self {
        let shard_count = config.shards.max(1);
        let slots_per_shard = config.capacity.max(1).div_ceil(shard_count);

        let shards = (0..shard_count)
            .map(|_| Mutex::new(vec![None; slots_per_shard].into_boxed_slice()))
            .collect();

        Self {
            shards,
            slots_per_shard,
            policy: config.collision_policy,
            epoch: AtomicU64::new(0),
        }
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.shards.len() * self.slots_per_shard
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Starts a new suppression window. Entries from older epochs no
    /// longer suppress anything; they are overwritten as flows report.
    pub fn advance_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "Flow state clear cycle");
        epoch
    }

    /// Slots written in the current epoch.
    pub fn live_entries(&self) -> usize {
        let epoch = self.current_epoch();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .iter()
                    .filter(|slot| slot.is_some_and(|e| e.epoch == epoch))
                    .count()
            })
            .sum()
    }

    fn locate(&self, digest: u64) -> (usize, usize) {
        let shard_count = self.shards.len() as u64;
        let shard = (digest % shard_count) as usize;
        let slot = ((digest / shard_count) % self.slots_per_shard as u64) as usize;
        (shard, slot)
    }

    /// Decides whether a FLOW report for this packet is new information.
    ///
    /// With `report_all` the answer is always yes; the slot is still
    /// refreshed so later packets compare against the latest state.
    pub fn should_report(
        &self,
        flow: &FlowKey,
        path_digest: u32,
        latency_bucket: u32,
        report_all: bool,
    ) -> bool {
        let digest = flow_digest(flow);
        let epoch = self.current_epoch();
        let (shard, slot) = self.locate(digest);

        let mut slots = self.shards[shard].lock();
        let entry = &mut slots[slot];

        let unchanged = entry.is_some_and(|e| {
            let same_flow = match self.policy {
                CollisionPolicy::Evict => e.flow_tag == digest,
                CollisionPolicy::Alias => true,
            };
            same_flow
                && e.epoch == epoch
                && e.path_digest == path_digest
                && e.latency_bucket == latency_bucket
        });

        if unchanged && !report_all {
            return false;
        }

        *entry = Some(SuppressionEntry {
            flow_tag: digest,
            path_digest,
            latency_bucket,
            epoch,
        });
        true
    }
}

//! Live instance inventory.

use std::collections::{BTreeMap, VecDeque};

use fleetplan_core::{DatacenterId, GenerationId, ServerId};

/// The key under which live instances are tracked.
///
/// Demand snapshots, inventory, and usage all key on the resolved
/// `(datacenter, generation)` pair, never on the latency tier: when a tier
/// alternates between datacenters, per-datacenter capacity is only
/// accountable at this granularity.
pub type FleetKey = (DatacenterId, GenerationId);

/// The set of currently active server instances, in creation order.
///
/// Instances enter on a buy action and leave on a dismiss; a dismissed
/// instance is never reused. The front of each queue is the oldest live
/// instance for that key.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    live: BTreeMap<FleetKey, VecDeque<ServerId>>,
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly purchased instance.
    pub fn record(&mut self, key: FleetKey, id: ServerId) {
        self.live.entry(key).or_default().push_back(id);
    }

    /// Removes and returns the oldest live instance for a key, if any.
    pub fn pop_oldest(&mut self, key: &FleetKey) -> Option<ServerId> {
        let queue = self.live.get_mut(key)?;
        let id = queue.pop_front();
        if queue.is_empty() {
            self.live.remove(key);
        }
        id
    }

    /// Number of live instances for a key.
    #[must_use]
    pub fn active_count(&self, key: &FleetKey) -> usize {
        self.live.get(key).map_or(0, VecDeque::len)
    }

    /// Total live instances across all keys.
    #[must_use]
    pub fn total_active(&self) -> usize {
        self.live.values().map(VecDeque::len).sum()
    }

    /// Iterates live instances for a key, oldest first.
    pub fn live_instances(&self, key: &FleetKey) -> impl Iterator<Item = &ServerId> {
        self.live.get(key).into_iter().flatten()
    }
}

//! The reconciliation loop.
//!
//! The reconciler walks the demand plan one time step at a time. For each
//! (tier, generation) cell it compares the requested active count to the
//! count realized at the previous step and emits the buy or dismiss actions
//! that close the gap, clamped to the datacenter's remaining slot capacity
//! and the set of live instances.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, trace};

use fleetplan_core::{
    Action, ActionKind, Catalog, CatalogError, DatacenterId, DemandCell, DemandTable,
    GenerationId, LatencyTier, ServerId, TimeStep,
};

use crate::inventory::{FleetKey, Inventory};
use crate::placement::{ParityRoundRobin, PlacementPolicy};

/// Result type for reconciler operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur during reconciliation.
///
/// Catalog errors are fatal input errors: the plan references something the
/// catalog never defined, so no partial action list should be trusted. The
/// capacity and usage variants are internal invariant violations — the
/// clamping logic should make them unreachable, so hitting one indicates a
/// bug, not a recoverable condition.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(
        "capacity exceeded in {datacenter}: usage {usage} + slot size {slot_size} \
         would pass capacity {capacity}"
    )]
    CapacityExceeded {
        datacenter: DatacenterId,
        capacity: u32,
        usage: u32,
        slot_size: u32,
    },

    #[error("slot usage in {datacenter} would go negative: usage {usage}, slot size {slot_size}")]
    NegativeUsage {
        datacenter: DatacenterId,
        usage: u32,
        slot_size: u32,
    },
}

/// Statistics from reconciliation, accumulated across `run` calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub steps_processed: u32,
    pub cells_skipped: u32,
    pub instances_bought: u32,
    pub instances_dismissed: u32,
}

/// Converts target fleet counts into feasible, ordered buy/dismiss actions.
///
/// All mutable state lives here: the live inventory, per-datacenter slot
/// usage, and the previous realized-demand snapshot. The loop is strictly
/// sequential; each step's realized counts are input to the next step's
/// deltas.
pub struct Reconciler {
    catalog: Catalog,
    policy: Box<dyn PlacementPolicy>,
    inventory: Inventory,
    usage: BTreeMap<DatacenterId, u32>,
    previous: BTreeMap<FleetKey, u32>,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Creates a reconciler with the default parity round-robin placement.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self::with_policy(catalog, Box::new(ParityRoundRobin))
    }

    /// Creates a reconciler with a custom placement policy.
    #[must_use]
    pub fn with_policy(catalog: Catalog, policy: Box<dyn PlacementPolicy>) -> Self {
        Self {
            catalog,
            policy,
            inventory: Inventory::new(),
            usage: BTreeMap::new(),
            previous: BTreeMap::new(),
            stats: ReconcileStats::default(),
        }
    }

    /// Reconciles the full demand plan into an ordered action trace.
    ///
    /// Time steps are visited in ascending numeric order; within a step,
    /// tiers and cells follow the table's order. Ordering across independent
    /// keys only affects the interleaving of the output, not its
    /// correctness.
    #[instrument(skip_all, fields(steps = table.len()))]
    pub fn run(&mut self, table: &DemandTable) -> ReconcileResult<Vec<Action>> {
        let mut actions = Vec::new();

        for (step, tiers) in table.iter() {
            let before = actions.len();
            for (tier, cells) in tiers {
                for cell in cells {
                    self.advance(step, *tier, cell, &mut actions)?;
                }
            }
            self.stats.steps_processed += 1;
            debug!(
                step = step.value(),
                emitted = actions.len() - before,
                live = self.inventory.total_active(),
                "Step reconciled"
            );
        }

        info!(
            steps_processed = self.stats.steps_processed,
            cells_skipped = self.stats.cells_skipped,
            instances_bought = self.stats.instances_bought,
            instances_dismissed = self.stats.instances_dismissed,
            "Reconciliation complete"
        );

        Ok(actions)
    }

    /// Processes one demand cell at one time step.
    ///
    /// Cells whose generation is outside its lifecycle window at `step` are
    /// skipped entirely: no action, no state change. Otherwise the delta
    /// against the previous realized count is closed as far as capacity and
    /// live inventory allow, and the realized count — clamped, not the raw
    /// request — becomes the new snapshot value for the key.
    pub fn advance(
        &mut self,
        step: TimeStep,
        tier: LatencyTier,
        cell: &DemandCell,
        actions: &mut Vec<Action>,
    ) -> ReconcileResult<()> {
        let generation = self.catalog.generation(&cell.generation)?.clone();

        if !generation.is_active(step) {
            self.stats.cells_skipped += 1;
            trace!(
                step = step.value(),
                generation = %generation.id,
                "Demand outside lifecycle window, skipped"
            );
            return Ok(());
        }

        let candidates = self.catalog.tier_datacenters(tier)?;
        let datacenter_id = self.policy.resolve(tier, step, candidates).clone();
        let datacenter = self.catalog.datacenter(&datacenter_id)?.clone();

        let key: FleetKey = (datacenter_id.clone(), generation.id.clone());
        let previous = self.previous.get(&key).copied().unwrap_or(0);
        let requested = cell.count;

        let realized = match requested.cmp(&previous) {
            std::cmp::Ordering::Greater => {
                let bought = self.buy(
                    step,
                    &key,
                    requested - previous,
                    datacenter.slots_capacity,
                    generation.slot_size,
                    actions,
                )?;
                previous + bought
            }
            std::cmp::Ordering::Less => {
                let dismissed =
                    self.dismiss(step, &key, previous - requested, generation.slot_size, actions)?;
                previous - dismissed
            }
            std::cmp::Ordering::Equal => previous,
        };

        if realized != requested {
            debug!(
                step = step.value(),
                datacenter = %key.0,
                generation = %key.1,
                requested,
                realized,
                "Request clamped to feasible count"
            );
        }

        self.previous.insert(key, realized);
        Ok(())
    }

    /// Purchases up to `wanted` instances, clamped to remaining capacity.
    ///
    /// Returns the number actually bought. Each unit's four effects (action
    /// record, ID allocation, inventory entry, usage bump) happen together;
    /// the capacity check precedes all of them.
    fn buy(
        &mut self,
        step: TimeStep,
        key: &FleetKey,
        wanted: u32,
        capacity: u32,
        slot_size: u32,
        actions: &mut Vec<Action>,
    ) -> ReconcileResult<u32> {
        let mut usage = self.usage.get(&key.0).copied().unwrap_or(0);
        let free = capacity.saturating_sub(usage);
        let purchasable = wanted.min(free / slot_size);

        for _ in 0..purchasable {
            // Admission clamping above should make this unreachable.
            if usage + slot_size > capacity {
                return Err(ReconcileError::CapacityExceeded {
                    datacenter: key.0.clone(),
                    capacity,
                    usage,
                    slot_size,
                });
            }

            let server_id = ServerId::new();
            actions.push(buy_action(step, key, server_id));
            self.inventory.record(key.clone(), server_id);
            usage += slot_size;
        }

        self.usage.insert(key.0.clone(), usage);
        self.stats.instances_bought += purchasable;
        Ok(purchasable)
    }

    /// Dismisses up to `wanted` instances, oldest first (FIFO).
    ///
    /// Returns the number actually dismissed, clamped to the live count for
    /// the key. The usage check precedes the inventory pop.
    fn dismiss(
        &mut self,
        step: TimeStep,
        key: &FleetKey,
        wanted: u32,
        slot_size: u32,
        actions: &mut Vec<Action>,
    ) -> ReconcileResult<u32> {
        let live = u32::try_from(self.inventory.active_count(key)).unwrap_or(u32::MAX);
        let dismissible = wanted.min(live);

        let mut usage = self.usage.get(&key.0).copied().unwrap_or(0);
        let mut dismissed = 0;

        while dismissed < dismissible {
            // Clamping to the live count should make this unreachable.
            if usage < slot_size {
                return Err(ReconcileError::NegativeUsage {
                    datacenter: key.0.clone(),
                    usage,
                    slot_size,
                });
            }

            let Some(server_id) = self.inventory.pop_oldest(key) else {
                break;
            };
            actions.push(dismiss_action(step, key, server_id));
            usage -= slot_size;
            dismissed += 1;
        }

        self.usage.insert(key.0.clone(), usage);
        self.stats.instances_dismissed += dismissed;
        Ok(dismissed)
    }

    /// Live instance count for a (datacenter, generation) key.
    #[must_use]
    pub fn active_count(&self, datacenter: &DatacenterId, generation: &GenerationId) -> usize {
        self.inventory
            .active_count(&(datacenter.clone(), generation.clone()))
    }

    /// Current slot usage of a datacenter.
    #[must_use]
    pub fn slot_usage(&self, datacenter: &DatacenterId) -> u32 {
        self.usage.get(datacenter).copied().unwrap_or(0)
    }

    /// Last realized count for a (datacenter, generation) key.
    #[must_use]
    pub fn realized(&self, datacenter: &DatacenterId, generation: &GenerationId) -> u32 {
        self.previous
            .get(&(datacenter.clone(), generation.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Accumulated statistics across all `run`/`advance` calls.
    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// The live inventory.
    #[must_use]
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }
}

fn buy_action(step: TimeStep, key: &FleetKey, server_id: ServerId) -> Action {
    Action {
        time_step: step,
        datacenter_id: key.0.clone(),
        server_generation: key.1.clone(),
        server_id,
        action: ActionKind::Buy,
    }
}

fn dismiss_action(step: TimeStep, key: &FleetKey, server_id: ServerId) -> Action {
    Action {
        time_step: step,
        datacenter_id: key.0.clone(),
        server_generation: key.1.clone(),
        server_id,
        action: ActionKind::Dismiss,
    }
}

//! Tier-to-datacenter placement policies.

use fleetplan_core::{DatacenterId, LatencyTier, TimeStep};

/// Chooses which datacenter services a tier's demand at a given time step.
///
/// Kept behind a trait so alternative splitting policies (proportional,
/// load-based) can be substituted without touching the reconciler. Callers
/// expecting proportional splitting must supply already-split
/// per-datacenter demand.
pub trait PlacementPolicy {
    /// Picks one datacenter from the tier's route.
    ///
    /// `candidates` comes from the catalog's tier routing table and is
    /// never empty (catalog validation rejects empty routes).
    fn resolve<'a>(
        &self,
        tier: LatencyTier,
        step: TimeStep,
        candidates: &'a [DatacenterId],
    ) -> &'a DatacenterId;
}

/// Deterministic round-robin keyed by time-step parity.
///
/// For a two-datacenter route this alternates between them on odd and even
/// steps; single-datacenter routes are unaffected. Not load-based.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParityRoundRobin;

impl PlacementPolicy for ParityRoundRobin {
    fn resolve<'a>(
        &self,
        _tier: LatencyTier,
        step: TimeStep,
        candidates: &'a [DatacenterId],
    ) -> &'a DatacenterId {
        let index = (step.value().saturating_sub(1) as usize) % candidates.len();
        &candidates[index]
    }
}

//! # fleetplan-reconcile
//!
//! Reconciliation of a time-indexed demand plan into a feasible, ordered
//! fleet action trace. Key concepts:
//!
//! - **Requested state**: how many instances of each server generation a
//!   datacenter should have active at a time step (from the upstream plan).
//! - **Realized state**: how many instances actually exist, after capacity
//!   clamping and lifecycle filtering.
//! - **Reconciliation**: emitting the buy/dismiss actions that move realized
//!   state toward requested state, one time step at a time.
//!
//! # Invariants
//!
//! - Per-datacenter slot usage stays within `[0, capacity]` after every
//!   single action, not just at time-step boundaries
//! - No action is emitted outside its generation's lifecycle window
//! - Dismissals retire the oldest live instance first (FIFO)
//! - Deltas are computed against realized counts, so an infeasible request
//!   at one step does not poison later steps

mod inventory;
mod placement;
mod reconciler;

pub use inventory::{FleetKey, Inventory};
pub use placement::{ParityRoundRobin, PlacementPolicy};
pub use reconciler::{ReconcileError, ReconcileStats, Reconciler};

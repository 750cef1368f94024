//! # fleetplan-core
//!
//! Typed identifiers, catalog reference data, and wire schemas for the
//! fleetplan reconciliation pipeline.
//!
//! ## Design Principles
//!
//! - Server instance IDs are system-generated and opaque; datacenter and
//!   generation IDs come from the static catalog and are validated labels
//! - The demand table is validated once at the boundary; the core never
//!   walks untyped JSON
//! - Actions are immutable records; the ordered action list is the sole
//!   output artifact of a reconciliation run

mod action;
mod catalog;
mod demand;
mod id;

pub use action::{Action, ActionKind};
pub use catalog::{
    Catalog, CatalogError, Datacenter, LatencyTier, ServerFamily, ServerGeneration,
};
pub use demand::{DemandCell, DemandError, DemandTable};
pub use id::{DatacenterId, GenerationId, IdError, ServerId, TimeStep};

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

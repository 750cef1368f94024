//! Static catalog: datacenters, server generations, and tier routing.
//!
//! The catalog is supplied once at startup and immutable thereafter. Every
//! lookup is fallible: a demand plan referencing a datacenter, generation,
//! or latency tier absent from the catalog is a fatal input error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{DatacenterId, GenerationId, TimeStep};

/// Errors from catalog lookups and validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    /// The demand plan references a datacenter the catalog does not define.
    #[error("unknown datacenter: {0}")]
    UnknownDatacenter(DatacenterId),

    /// The demand plan references a generation the catalog does not define.
    #[error("unknown server generation: {0}")]
    UnknownGeneration(GenerationId),

    /// The demand plan references a latency tier with no datacenter route.
    #[error("no datacenter route for latency tier: {0}")]
    UnroutedTier(LatencyTier),

    /// The catalog data itself is inconsistent.
    #[error("invalid catalog: {message}")]
    Invalid { message: String },
}

/// Server hardware family. Informational only; slot accounting uses
/// `slot_size`, not the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerFamily {
    Cpu,
    Gpu,
}

/// A physical datacenter with fixed slot capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: DatacenterId,

    /// Energy cost per unit power at this site.
    pub cost_of_energy: f64,

    /// Total server slots physically available.
    pub slots_capacity: u32,
}

/// A server generation: slot footprint and release lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGeneration {
    pub id: GenerationId,
    pub family: ServerFamily,

    /// Slots consumed per instance of this generation.
    pub slot_size: u32,

    /// First time step at which instances may exist (inclusive).
    pub active_from: TimeStep,

    /// Time step at which the generation retires (exclusive).
    pub active_until: TimeStep,
}

impl ServerGeneration {
    /// Returns true if instances of this generation may exist at `step`.
    ///
    /// The lifecycle window is half-open: `[active_from, active_until)`.
    #[must_use]
    pub fn is_active(&self, step: TimeStep) -> bool {
        self.active_from <= step && step < self.active_until
    }
}

/// Latency sensitivity tier of a demand row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LatencyTier {
    Low,
    Medium,
    High,
}

impl LatencyTier {
    /// Parses a tier label as it appears in the upstream demand plan.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for LatencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Read-only reference data for a reconciliation run.
///
/// Holds the datacenter and generation definitions plus the fixed mapping
/// from latency tier to the datacenter(s) eligible to service it.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "CatalogData")]
pub struct Catalog {
    datacenters: BTreeMap<DatacenterId, Datacenter>,
    generations: BTreeMap<GenerationId, ServerGeneration>,
    tier_routes: BTreeMap<LatencyTier, Vec<DatacenterId>>,
}

impl Catalog {
    /// Builds a catalog from its parts, validating internal consistency.
    pub fn new(
        datacenters: Vec<Datacenter>,
        generations: Vec<ServerGeneration>,
        tier_routes: BTreeMap<LatencyTier, Vec<DatacenterId>>,
    ) -> Result<Self, CatalogError> {
        let mut dc_map = BTreeMap::new();
        for dc in datacenters {
            if dc_map.insert(dc.id.clone(), dc.clone()).is_some() {
                return Err(CatalogError::Invalid {
                    message: format!("duplicate datacenter: {}", dc.id),
                });
            }
        }

        let mut gen_map = BTreeMap::new();
        for gen in generations {
            if gen.slot_size == 0 {
                return Err(CatalogError::Invalid {
                    message: format!("generation {} has zero slot size", gen.id),
                });
            }
            if gen.active_until <= gen.active_from {
                return Err(CatalogError::Invalid {
                    message: format!(
                        "generation {} has empty lifecycle window [{}, {})",
                        gen.id, gen.active_from, gen.active_until
                    ),
                });
            }
            if gen_map.insert(gen.id.clone(), gen.clone()).is_some() {
                return Err(CatalogError::Invalid {
                    message: format!("duplicate generation: {}", gen.id),
                });
            }
        }

        for (tier, route) in &tier_routes {
            if route.is_empty() {
                return Err(CatalogError::Invalid {
                    message: format!("empty datacenter route for tier {tier}"),
                });
            }
            for dc in route {
                if !dc_map.contains_key(dc) {
                    return Err(CatalogError::Invalid {
                        message: format!("tier {tier} routes to unknown datacenter {dc}"),
                    });
                }
            }
        }

        Ok(Self {
            datacenters: dc_map,
            generations: gen_map,
            tier_routes,
        })
    }

    /// Looks up a datacenter definition.
    pub fn datacenter(&self, id: &DatacenterId) -> Result<&Datacenter, CatalogError> {
        self.datacenters
            .get(id)
            .ok_or_else(|| CatalogError::UnknownDatacenter(id.clone()))
    }

    /// Looks up a server generation definition.
    pub fn generation(&self, id: &GenerationId) -> Result<&ServerGeneration, CatalogError> {
        self.generations
            .get(id)
            .ok_or_else(|| CatalogError::UnknownGeneration(id.clone()))
    }

    /// Returns the datacenters eligible to service a latency tier.
    pub fn tier_datacenters(&self, tier: LatencyTier) -> Result<&[DatacenterId], CatalogError> {
        self.tier_routes
            .get(&tier)
            .map(Vec::as_slice)
            .ok_or(CatalogError::UnroutedTier(tier))
    }

    /// Iterates all datacenter definitions.
    pub fn datacenters(&self) -> impl Iterator<Item = &Datacenter> {
        self.datacenters.values()
    }

    /// The built-in reference catalog.
    ///
    /// Four datacenters (DC1 low, DC2 medium, DC3/DC4 alternating high) and
    /// seven server generations with staggered lifecycle windows over 168
    /// time steps.
    #[must_use]
    pub fn reference() -> Self {
        let datacenters = vec![
            Datacenter {
                id: "DC1".into(),
                cost_of_energy: 0.25,
                slots_capacity: 25245,
            },
            Datacenter {
                id: "DC2".into(),
                cost_of_energy: 0.35,
                slots_capacity: 15300,
            },
            Datacenter {
                id: "DC3".into(),
                cost_of_energy: 0.65,
                slots_capacity: 7020,
            },
            Datacenter {
                id: "DC4".into(),
                cost_of_energy: 0.75,
                slots_capacity: 8280,
            },
        ];

        let cpu = |id: &str, from: u32, until: u32| ServerGeneration {
            id: id.into(),
            family: ServerFamily::Cpu,
            slot_size: 2,
            active_from: TimeStep::new(from),
            active_until: TimeStep::new(until),
        };
        let gpu = |id: &str, from: u32, until: u32| ServerGeneration {
            id: id.into(),
            family: ServerFamily::Gpu,
            slot_size: 4,
            active_from: TimeStep::new(from),
            active_until: TimeStep::new(until),
        };
        let generations = vec![
            cpu("CPU.S1", 1, 61),
            cpu("CPU.S2", 37, 97),
            cpu("CPU.S3", 73, 133),
            cpu("CPU.S4", 109, 169),
            gpu("GPU.S1", 1, 73),
            gpu("GPU.S2", 49, 121),
            gpu("GPU.S3", 97, 169),
        ];

        let tier_routes = BTreeMap::from([
            (LatencyTier::Low, vec![DatacenterId::new("DC1")]),
            (LatencyTier::Medium, vec![DatacenterId::new("DC2")]),
            (
                LatencyTier::High,
                vec![DatacenterId::new("DC3"), DatacenterId::new("DC4")],
            ),
        ]);

        Self::new(datacenters, generations, tier_routes)
            .unwrap_or_else(|e| unreachable!("reference catalog is valid: {e}"))
    }
}

/// Raw catalog shape for deserialization; validated into [`Catalog`].
#[derive(Debug, Deserialize)]
struct CatalogData {
    datacenters: Vec<Datacenter>,
    server_generations: Vec<ServerGeneration>,
    tier_routes: BTreeMap<LatencyTier, Vec<DatacenterId>>,
}

impl TryFrom<CatalogData> for Catalog {
    type Error = CatalogError;

    fn try_from(data: CatalogData) -> Result<Self, Self::Error> {
        Self::new(data.datacenters, data.server_generations, data.tier_routes)
    }
}

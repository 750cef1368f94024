//! Demand plan schema and boundary validation.
//!
//! The upstream optimizer emits a loosely structured JSON table:
//!
//! ```json
//! { "1": { "high": [ {"GPU.S1": 5} ], "low": [ {"CPU.S1": 120} ] } }
//! ```
//!
//! [`DemandTable::from_json`] validates that shape exactly once, at the
//! boundary. Inside the core, demand is typed field access over a
//! [`BTreeMap`], which also guarantees ascending time-step iteration
//! regardless of input key order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::LatencyTier;
use crate::id::{GenerationId, TimeStep};

/// Errors from validating the upstream demand plan.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DemandError {
    /// The top level is not an object keyed by time step.
    #[error("demand plan must be a JSON object keyed by time step")]
    NotAnObject,

    /// A time-step key is not a positive integer.
    #[error("invalid time step key: {0:?}")]
    InvalidTimeStep(String),

    /// A tier label is not one of `low`, `medium`, `high`.
    #[error("unknown latency tier at step {step}: {label:?}")]
    UnknownTier { step: TimeStep, label: String },

    /// A demand cell is not a single-entry `{generation: count}` object.
    #[error("malformed demand cell at step {step}, tier {tier}")]
    MalformedCell { step: TimeStep, tier: LatencyTier },

    /// A requested count is negative or not an integer.
    #[error("invalid requested count for {generation} at step {step}: {value}")]
    InvalidCount {
        step: TimeStep,
        generation: GenerationId,
        value: String,
    },
}

/// One demand cell: the target number of simultaneously active instances
/// of a generation. An absolute target, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandCell {
    pub generation: GenerationId,
    pub count: u32,
}

/// The full demand plan: time step → latency tier → demand cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandTable {
    steps: BTreeMap<TimeStep, BTreeMap<LatencyTier, Vec<DemandCell>>>,
}

impl DemandTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested count for a (step, tier, generation) cell.
    ///
    /// Appends to the tier's cell list; used by tests and by callers that
    /// build plans programmatically.
    pub fn push(&mut self, step: TimeStep, tier: LatencyTier, generation: GenerationId, count: u32) {
        self.steps
            .entry(step)
            .or_default()
            .entry(tier)
            .or_default()
            .push(DemandCell { generation, count });
    }

    /// Iterates time steps in ascending order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (TimeStep, &BTreeMap<LatencyTier, Vec<DemandCell>>)> {
        self.steps.iter().map(|(step, tiers)| (*step, tiers))
    }

    /// Returns true if the plan contains no time steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of time steps in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Validates the upstream optimizer's JSON shape into a typed table.
    ///
    /// Accepts `{"<step>": {"<tier>": [{"<generation>": count}, ...]}}` with
    /// time steps as decimal string keys and each cell a single-entry
    /// object. Counts must be non-negative integers; zero is a valid target.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DemandError> {
        let top = value.as_object().ok_or(DemandError::NotAnObject)?;

        let mut table = Self::new();
        for (step_key, tiers_value) in top {
            let step = step_key
                .parse::<u32>()
                .ok()
                .filter(|s| *s > 0)
                .map(TimeStep::new)
                .ok_or_else(|| DemandError::InvalidTimeStep(step_key.clone()))?;

            let tiers = tiers_value
                .as_object()
                .ok_or(DemandError::NotAnObject)?;

            for (tier_label, cells_value) in tiers {
                let tier = LatencyTier::parse(tier_label).ok_or_else(|| {
                    DemandError::UnknownTier {
                        step,
                        label: tier_label.clone(),
                    }
                })?;

                let cells = cells_value
                    .as_array()
                    .ok_or(DemandError::MalformedCell { step, tier })?;

                for cell in cells {
                    let entry = cell
                        .as_object()
                        .filter(|obj| obj.len() == 1)
                        .and_then(|obj| obj.iter().next())
                        .ok_or(DemandError::MalformedCell { step, tier })?;

                    let generation = GenerationId::new(entry.0.clone());
                    let count = parse_count(entry.1).ok_or_else(|| {
                        DemandError::InvalidCount {
                            step,
                            generation: generation.clone(),
                            value: entry.1.to_string(),
                        }
                    })?;

                    table.push(step, tier, generation, count);
                }
            }
        }

        Ok(table)
    }
}

/// Accepts non-negative integers, including LP-solver floats with zero
/// fractional part (e.g. `14.0`).
fn parse_count(value: &serde_json::Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    if let Some(f) = value.as_f64() {
        if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
            return Some(f as u32);
        }
    }
    None
}

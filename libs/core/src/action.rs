//! Fleet action records.
//!
//! The ordered action list is the sole output of a reconciliation run.
//! Consumers must replay actions in the given order; replaying out of order
//! does not preserve the capacity invariants.

use serde::{Deserialize, Serialize};

use crate::id::{DatacenterId, GenerationId, ServerId, TimeStep};

/// What the action does to the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Buy,
    Dismiss,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "buy",
            Self::Dismiss => "dismiss",
        };
        write!(f, "{s}")
    }
}

/// One discrete fleet action. Produced, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub time_step: TimeStep,
    pub datacenter_id: DatacenterId,
    pub server_generation: GenerationId,
    pub server_id: ServerId,
    pub action: ActionKind,
}

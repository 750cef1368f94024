//! Typed identifiers for fleet resources.
//!
//! Server instance IDs use a prefixed ULID format (`srv_{ulid}`) for
//! sortability and uniqueness. Datacenter and generation identifiers are
//! catalog-supplied labels wrapped in newtypes so the two cannot be mixed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}

/// A unique identifier for a concrete server instance.
///
/// Allocated by the reconciler on a buy action and never reused after the
/// instance is dismissed. The string form is `srv_{ulid}`; ULIDs are
/// time-ordered, so IDs sort by purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerId(Ulid);

impl ServerId {
    /// The prefix for server instance IDs.
    pub const PREFIX: &'static str = "srv";

    /// Creates a new ID with a fresh ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> Ulid {
        self.0
    }

    /// Parses an ID from a string in the format `srv_{ulid}`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((prefix, ulid_str)) = s.split_once('_') else {
            return Err(IdError::MissingSeparator);
        };

        if prefix != Self::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        let ulid = ulid_str
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;

        Ok(Self(ulid))
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl std::str::FromStr for ServerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ServerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ServerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A datacenter identifier as defined by the catalog (e.g. `DC1`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DatacenterId(String);

impl DatacenterId {
    /// Creates a datacenter ID from a label.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatacenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DatacenterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A server generation identifier as defined by the catalog (e.g. `CPU.S1`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GenerationId(String);

impl GenerationId {
    /// Creates a generation ID from a label.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GenerationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A discrete simulation time step.
///
/// Time steps are positive integers supplied by the demand plan; they are
/// not wall-clock timestamps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeStep(u32);

impl TimeStep {
    /// Creates a time step from its numeric value.
    #[must_use]
    pub const fn new(step: u32) -> Self {
        Self(step)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TimeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TimeStep {
    fn from(step: u32) -> Self {
        Self(step)
    }
}

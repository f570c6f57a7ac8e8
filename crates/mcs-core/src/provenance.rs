//! Provenance and schema descriptors attached to persisted simulation state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Provenance information attached to every checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Name of the sampling algorithm that produced the state.
    pub algorithm: String,
    /// Seed of the coordinating random stream.
    pub seed: u64,
    /// Free-form labels (model name, lattice size, ...).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Creates provenance for the named algorithm.
    pub fn new(algorithm: impl Into<String>, seed: u64) -> Self {
        Self {
            algorithm: algorithm.into(),
            seed,
            labels: BTreeMap::new(),
        }
    }

    /// Attaches a label to the provenance record.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use mcs_core::errors::ErrorInfo;
use mcs_core::provenance::{RunProvenance, SchemaVersion};
use mcs_core::McsError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Schema version written into every checkpoint.
pub const CHECKPOINT_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Envelope around a captured simulation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    /// Schema of the envelope.
    pub schema: SchemaVersion,
    /// Where the state came from.
    pub provenance: RunProvenance,
    /// Sweep counter at capture time.
    pub sweep: u64,
    /// The captured state.
    pub state: T,
}

impl<T> Checkpoint<T> {
    /// Wraps `state` with the current schema.
    pub fn new(provenance: RunProvenance, sweep: u64, state: T) -> Self {
        Self {
            schema: CHECKPOINT_SCHEMA,
            provenance,
            sweep,
            state,
        }
    }
}

impl<T: DeserializeOwned> Checkpoint<T> {
    /// Restores a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Self, McsError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            McsError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        let checkpoint: Self = serde_json::from_str(&contents).map_err(|err| {
            McsError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        if checkpoint.schema.major != CHECKPOINT_SCHEMA.major {
            return Err(McsError::Serde(
                ErrorInfo::new("checkpoint-schema", "unsupported checkpoint schema")
                    .with_context("path", path.display())
                    .with_context("major", checkpoint.schema.major),
            ));
        }
        Ok(checkpoint)
    }
}

impl<T: Serialize> Checkpoint<T> {
    /// Writes the checkpoint to disk, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<(), McsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                McsError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            McsError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            McsError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }
}

/// Determines the checkpoint file path for a sweep using a deterministic numbering scheme.
pub fn checkpoint_path(root: &Path, sweep: u64) -> PathBuf {
    root.join(format!("ckpt_{sweep:05}.json"))
}

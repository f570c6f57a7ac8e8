//! Error families reported by the samplers.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and the offending values of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable kebab-case code, e.g. `wl-flatness`.
    pub code: String,
    /// What went wrong.
    pub message: String,
    /// Offending values keyed by name (parameter, expected, actual, energy).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Payload without context.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Records `key = value`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " ({key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Error type of every fallible sampler operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum McsError {
    /// Mismatched counts or empty collections (replicas, temperatures, windows).
    #[error("invalid range: {0}")]
    InvalidRange(ErrorInfo),
    /// Elementwise arithmetic on histograms with differing key sets.
    #[error("incompatible operands: {0}")]
    Incompatible(ErrorInfo),
    /// A configuration energy lies outside the window assigned to its replica.
    #[error("energy out of range: {0}")]
    EnergyOutOfRange(ErrorInfo),
    /// Simulation parameters that cannot drive a run.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization, schema and file errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl McsError {
    /// Payload of any family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            McsError::InvalidRange(info)
            | McsError::Incompatible(info)
            | McsError::EnergyOutOfRange(info)
            | McsError::Config(info)
            | McsError::Serde(info) => info,
        }
    }

    /// [`McsError::Config`] naming the rejected `parameter` and its `value`.
    pub fn config(code: &str, parameter: &str, value: impl ToString) -> Self {
        McsError::Config(
            ErrorInfo::new(code, format!("parameter `{parameter}` is out of bounds"))
                .with_context("parameter", parameter)
                .with_context("value", value),
        )
    }

    /// [`McsError::InvalidRange`] for `actual` items where `expected` were needed.
    pub fn count_mismatch(code: &str, expected: usize, actual: usize) -> Self {
        McsError::InvalidRange(
            ErrorInfo::new(code, "number of items does not match the expected count")
                .with_context("expected", expected)
                .with_context("actual", actual),
        )
    }
}

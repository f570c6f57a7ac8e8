use std::fs;
use std::path::Path;

use mcs_core::errors::ErrorInfo;
use mcs_core::McsError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::SamplingMode;

/// Schedule of a fixed-temperature Metropolis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetropolisParameters {
    /// Steps discarded before the first measurement.
    #[serde(default = "default_relaxation_steps")]
    pub relaxation_steps: u64,
    /// Number of measurements to take.
    #[serde(default = "default_measurement_number")]
    pub measurement_number: u64,
    /// Steps between two measurements.
    #[serde(default = "default_steps_between_measurement")]
    pub steps_between_measurement: u64,
    /// Step selection mode.
    #[serde(default)]
    pub sampling_mode: SamplingMode,
}

fn default_relaxation_steps() -> u64 {
    1000
}

fn default_measurement_number() -> u64 {
    100
}

fn default_steps_between_measurement() -> u64 {
    100
}

impl Default for MetropolisParameters {
    fn default() -> Self {
        Self {
            relaxation_steps: default_relaxation_steps(),
            measurement_number: default_measurement_number(),
            steps_between_measurement: default_steps_between_measurement(),
            sampling_mode: SamplingMode::default(),
        }
    }
}

/// Parses parameters from a YAML document.
pub fn from_yaml_str<T: DeserializeOwned>(yaml: &str) -> Result<T, McsError> {
    serde_yaml::from_str(yaml).map_err(|err| {
        McsError::Serde(
            ErrorInfo::new("config-parse", err.to_string()).with_context("format", "yaml"),
        )
    })
}

/// Loads parameters from a YAML file.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, McsError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        McsError::Serde(
            ErrorInfo::new("config-read", err.to_string())
                .with_context("path", path.display()),
        )
    })?;
    from_yaml_str(&contents).map_err(|err| match err {
        McsError::Serde(info) => McsError::Serde(info.with_context("path", path.display())),
        other => other,
    })
}

/// Renders parameters as YAML.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, McsError> {
    serde_yaml::to_string(value)
        .map_err(|err| McsError::Serde(ErrorInfo::new("config-serialize", err.to_string())))
}

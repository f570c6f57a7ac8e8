use mcs_core::{EnergyValue, McsError};
use mcs_dos::WangLandauParameters;
use mcs_engine::SamplingMode;
use serde::{Deserialize, Serialize};

/// How per-replica batches are scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Execution {
    /// One replica after the other on the calling thread.
    Serial,
    /// On a dedicated rayon pool.
    Parallel {
        /// Worker threads of the pool.
        #[serde(default = "default_threads")]
        threads: usize,
    },
}

fn default_threads() -> usize {
    2
}

impl Default for Execution {
    fn default() -> Self {
        Execution::Serial
    }
}

/// Temperature ladder construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Number of replicas in the ladder.
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Temperature of the coldest replica.
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f64,
    /// Policy used to generate higher temperatures.
    #[serde(default)]
    pub policy: LadderPolicy,
}

fn default_replicas() -> usize {
    4
}

fn default_base_temperature() -> f64 {
    1.0
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            base_temperature: default_base_temperature(),
            policy: LadderPolicy::default(),
        }
    }
}

/// Supported ladder construction strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LadderPolicy {
    /// Geometric progression with a fixed ratio between neighbouring replicas.
    Geometric {
        /// Multiplicative spacing ratio between adjacent replicas.
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// Explicit temperatures, coldest first (overrides `replicas`).
    Manual {
        /// Ordered list of temperatures assigned to replicas.
        temperatures: Vec<f64>,
    },
}

fn default_ratio() -> f64 {
    1.5
}

impl Default for LadderPolicy {
    fn default() -> Self {
        LadderPolicy::Geometric {
            ratio: default_ratio(),
        }
    }
}

impl LadderConfig {
    /// Rejects temperatures that are not positive and finite.
    pub fn validate(&self) -> Result<(), McsError> {
        let temperatures: &[f64] = match &self.policy {
            LadderPolicy::Manual { temperatures } if !temperatures.is_empty() => temperatures,
            _ => std::slice::from_ref(&self.base_temperature),
        };
        if let Some(temperature) = temperatures
            .iter()
            .find(|temperature| !(temperature.is_finite() && **temperature > 0.0))
        {
            return Err(McsError::config(
                "ladder-temperature",
                "temperatures",
                temperature,
            ));
        }
        Ok(())
    }

    /// Temperatures of the ladder, coldest first.
    pub fn temperatures(&self) -> Vec<f64> {
        match &self.policy {
            LadderPolicy::Geometric { ratio } => {
                let ratio = ratio.max(1.01);
                let mut ladder = Vec::with_capacity(self.replicas.max(1));
                let mut temperature = self.base_temperature;
                for _ in 0..self.replicas.max(1) {
                    ladder.push(temperature);
                    temperature *= ratio;
                }
                ladder
            }
            LadderPolicy::Manual { temperatures } => {
                if temperatures.is_empty() {
                    vec![self.base_temperature]
                } else {
                    temperatures.clone()
                }
            }
        }
    }

    /// Inverse temperatures of the ladder, largest first.
    pub fn inverse_temperatures(&self) -> Vec<f64> {
        self.temperatures()
            .into_iter()
            .map(|temperature| 1.0 / temperature)
            .collect()
    }
}

/// Schedule of a tempering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperingParameters {
    /// Steps per replica before the first measurement.
    #[serde(default = "default_relaxation_steps")]
    pub relaxation_steps: u64,
    /// Number of measurements.
    #[serde(default = "default_measurement_number")]
    pub measurement_number: u64,
    /// Steps per replica between two measurements.
    #[serde(default = "default_steps_between_measurement")]
    pub steps_between_measurement: u64,
    /// Steps per replica between two exchange attempts.
    #[serde(default = "default_steps_between_replica_exchange")]
    pub steps_between_replica_exchange: u64,
    /// Scheduling of the replica batches.
    #[serde(default)]
    pub execution: Execution,
    /// Step selection mode of every replica.
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

fn default_steps_between_replica_exchange() -> u64 {
    10
}

impl Default for TemperingParameters {
    fn default() -> Self {
        Self {
            relaxation_steps: default_relaxation_steps(),
            measurement_number: default_measurement_number(),
            steps_between_measurement: default_steps_between_measurement(),
            steps_between_replica_exchange: default_steps_between_replica_exchange(),
            execution: Execution::default(),
            sampling_mode: SamplingMode::default(),
        }
    }
}

impl TemperingParameters {
    /// Checks that the schedule can make progress.
    pub fn validate(&self) -> Result<(), McsError> {
        if self.steps_between_replica_exchange == 0 {
            return Err(McsError::config(
                "tempering-exchange-interval",
                "steps_between_replica_exchange",
                0,
            ));
        }
        if let Execution::Parallel { threads: 0 } = self.execution {
            return Err(McsError::config("tempering-threads", "threads", 0));
        }
        Ok(())
    }
}

/// How the ladders visited by an optimization are combined into the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LadderWeighting {
    /// Keep the last measured ladder.
    #[default]
    OnlyLast,
    /// Weight each ladder by its smallest acceptance rate.
    WorstAcceptance,
    /// Weight each ladder by `(sum 1/a_i^2)^(-1/2)`, treating the boundary
    /// rates as independent errors.
    IndependentAcceptance,
}

/// Settings of the equal-acceptance ladder optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderOptimizationParameters {
    /// Measure-and-respace rounds.
    #[serde(default = "default_optimization_steps")]
    pub optimization_steps: u64,
    /// Steps per replica of one measurement batch; batches repeat until
    /// every boundary has seen an accepted exchange.
    #[serde(default = "default_steps_between_measurement")]
    pub steps_between_measurement: u64,
    /// Combination of the measured ladders.
    #[serde(default)]
    pub weighting: LadderWeighting,
}

fn default_optimization_steps() -> u64 {
    100
}

impl Default for LadderOptimizationParameters {
    fn default() -> Self {
        Self {
            optimization_steps: default_optimization_steps(),
            steps_between_measurement: default_steps_between_measurement(),
            weighting: LadderWeighting::default(),
        }
    }
}

impl LadderOptimizationParameters {
    /// Checks that every round can finish a measurement.
    pub fn validate(&self) -> Result<(), McsError> {
        if self.optimization_steps == 0 {
            return Err(McsError::config(
                "ladder-optimization-steps",
                "optimization_steps",
                0,
            ));
        }
        if self.steps_between_measurement == 0 {
            return Err(McsError::config(
                "ladder-measurement",
                "steps_between_measurement",
                0,
            ));
        }
        Ok(())
    }
}

/// Parameters of a Wang-Landau replica exchange run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaExchangeParameters<E> {
    /// Maximal sweeps per replica between two exchange attempts.
    #[serde(default = "default_sweeps_per_replica_exchange")]
    pub sweeps_per_replica_exchange: u64,
    /// Replicas sharing each energy window.
    #[serde(default = "default_simulations_per_window")]
    pub simulations_per_window: usize,
    /// Scheduling of the replica batches.
    #[serde(default)]
    pub execution: Execution,
    /// Energy windows `[lower, upper]`, ordered by energy.
    pub energy_ranges: Vec<(E, E)>,
    /// Wang-Landau parameters shared by all replicas; cutoffs are replaced by
    /// the replica's window.
    #[serde(default)]
    pub wang_landau: WangLandauParameters<E>,
}

fn default_sweeps_per_replica_exchange() -> u64 {
    10
}

fn default_simulations_per_window() -> usize {
    1
}

impl<E: EnergyValue> ReplicaExchangeParameters<E> {
    /// Parameters for `energy_ranges` with every other field at its default.
    pub fn with_ranges(energy_ranges: Vec<(E, E)>) -> Self {
        Self {
            sweeps_per_replica_exchange: default_sweeps_per_replica_exchange(),
            simulations_per_window: default_simulations_per_window(),
            execution: Execution::default(),
            energy_ranges,
            wang_landau: WangLandauParameters::default(),
        }
    }

    /// Checks windows, counts and the shared Wang-Landau parameters.
    pub fn validate(&self) -> Result<(), McsError> {
        if self.energy_ranges.is_empty() {
            return Err(McsError::count_mismatch("rewl-windows", 1, 0));
        }
        if self.simulations_per_window == 0 {
            return Err(McsError::config(
                "rewl-per-window",
                "simulations_per_window",
                0,
            ));
        }
        if self.sweeps_per_replica_exchange == 0 {
            return Err(McsError::config(
                "rewl-sweeps",
                "sweeps_per_replica_exchange",
                0,
            ));
        }
        if let Some((lower, upper)) = self
            .energy_ranges
            .iter()
            .find(|(lower, upper)| lower > upper)
        {
            return Err(McsError::config(
                "rewl-window",
                "energy_ranges",
                format!("{lower:?} > {upper:?}"),
            ));
        }
        if let Execution::Parallel { threads: 0 } = self.execution {
            return Err(McsError::config("rewl-threads", "threads", 0));
        }
        self.wang_landau.validate()
    }
}

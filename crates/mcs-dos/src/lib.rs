#![deny(missing_docs)]

//! Density-of-states estimators built on the MCS step engine.
//!
//! [`WangLandau`] produces a first estimate of `ln g(E)`, which
//! [`EntropicSampling`] and [`OptimalEnsembleSampling`] refine, and
//! [`MulticanonicalCounting`] turns into absolute state counts. The
//! [`thermo`] helpers turn any estimate into canonical averages.

/// Parameter structs and step schedules.
pub mod config;
/// Absolute state counts from Wang-Landau with a reference configuration.
pub mod counting;
/// Entropic (multicanonical) sampling.
pub mod entropic;
/// Optimal ensemble sampling.
pub mod optimal_ensemble;
/// Canonical averages from a log density of states.
pub mod thermo;
/// Wang-Landau sampling with multiplicative and 1/t schedules.
pub mod wang_landau;

pub use config::{
    EnergyCutoffs, EntropicParameters, OptimalEnsembleParameters, StepSchedule,
    WangLandauParameters,
};
pub use counting::{Counted, CountedEnergy, CountedStep, MulticanonicalCounting};
pub use entropic::{EntropicRule, EntropicSampling, EntropicState};
pub use optimal_ensemble::{
    OptimalEnsembleRule, OptimalEnsembleSampling, OptimalEnsembleState, WalkerLabel,
};
pub use thermo::{canonical_averages, log_partition_function, CanonicalAverages};
pub use wang_landau::{Schedule, WangLandau, WangLandauRule, WangLandauState};

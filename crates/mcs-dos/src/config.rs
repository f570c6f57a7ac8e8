use mcs_core::{EnergyValue, McsError};
use mcs_engine::SamplingMode;
use mcs_hist::Binning;
use serde::{Deserialize, Serialize};

/// Optional lower and upper bounds on the energies a walk may visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyCutoffs<E> {
    /// Smallest admissible energy.
    #[serde(default)]
    pub lower: Option<E>,
    /// Largest admissible energy.
    #[serde(default)]
    pub upper: Option<E>,
}

impl<E> Default for EnergyCutoffs<E> {
    fn default() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }
}

impl<E: EnergyValue> EnergyCutoffs<E> {
    /// Closed window `[lower, upper]`.
    pub fn window(lower: E, upper: E) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Whether `energy` lies inside the enabled bounds.
    pub fn admits(&self, energy: E) -> bool {
        self.lower.map_or(true, |lower| energy >= lower)
            && self.upper.map_or(true, |upper| energy <= upper)
    }
}

/// Parameters of a Wang-Landau run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WangLandauParameters<E> {
    /// Incidence counter flatness that ends a stage.
    #[serde(default = "default_wang_landau_flatness")]
    pub flatness: f64,
    /// Initial logarithmic modification factor.
    #[serde(default = "default_modification_factor_initial")]
    pub modification_factor_initial: f64,
    /// The run ends once the modification factor drops to this value.
    #[serde(default = "default_modification_factor_final")]
    pub modification_factor_final: f64,
    /// Factor applied to the modification factor after each stage.
    #[serde(default = "default_modification_factor_multiplier")]
    pub modification_factor_multiplier: f64,
    /// Steps per sweep.
    #[serde(default = "default_wang_landau_sweep_steps")]
    pub sweep_steps: u64,
    /// Reset the incidence counter every this many sweeps (0 disables).
    #[serde(default)]
    pub reset_sweep_number: u64,
    /// Switch to the 1/t schedule once it lies above the multiplicative one.
    #[serde(default)]
    pub one_over_t: bool,
    /// Energy window of the walk.
    #[serde(default)]
    pub cutoffs: EnergyCutoffs<E>,
    /// Binning of the log density of states and the incidence counter.
    #[serde(default)]
    pub binning: Binning<E>,
    /// Step selection mode.
    #[serde(default)]
    pub sampling_mode: SamplingMode,
}

fn default_wang_landau_flatness() -> f64 {
    0.8
}

fn default_modification_factor_initial() -> f64 {
    1.0
}

fn default_modification_factor_final() -> f64 {
    1e-7
}

fn default_modification_factor_multiplier() -> f64 {
    0.9
}

fn default_wang_landau_sweep_steps() -> u64 {
    1000
}

impl<E> Default for WangLandauParameters<E> {
    fn default() -> Self {
        Self {
            flatness: default_wang_landau_flatness(),
            modification_factor_initial: default_modification_factor_initial(),
            modification_factor_final: default_modification_factor_final(),
            modification_factor_multiplier: default_modification_factor_multiplier(),
            sweep_steps: default_wang_landau_sweep_steps(),
            reset_sweep_number: 0,
            one_over_t: false,
            cutoffs: EnergyCutoffs::default(),
            binning: Binning::Identity,
            sampling_mode: SamplingMode::default(),
        }
    }
}

impl<E> WangLandauParameters<E> {
    /// Checks that the parameters describe a terminating run.
    pub fn validate(&self) -> Result<(), McsError> {
        if !(self.flatness > 0.0 && self.flatness <= 1.0) {
            return Err(McsError::config("wl-flatness", "flatness", self.flatness));
        }
        if !(self.modification_factor_final > 0.0) {
            return Err(McsError::config(
                "wl-final",
                "modification_factor_final",
                self.modification_factor_final,
            ));
        }
        if !(self.modification_factor_multiplier > 0.0 && self.modification_factor_multiplier < 1.0)
        {
            return Err(McsError::config(
                "wl-multiplier",
                "modification_factor_multiplier",
                self.modification_factor_multiplier,
            ));
        }
        if !self.modification_factor_initial.is_finite() {
            return Err(McsError::config(
                "wl-initial",
                "modification_factor_initial",
                self.modification_factor_initial,
            ));
        }
        if self.sweep_steps == 0 {
            return Err(McsError::config("wl-sweep-steps", "sweep_steps", 0));
        }
        self.binning.validate()
    }
}

/// Parameters of an entropic sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntropicParameters<E> {
    /// Incidence counter flatness that ends the run.
    #[serde(default = "default_entropic_flatness")]
    pub flatness: f64,
    /// Steps per sweep.
    #[serde(default = "default_entropic_sweep_steps")]
    pub sweep_steps: u64,
    /// Energy window of the walk.
    #[serde(default)]
    pub cutoffs: EnergyCutoffs<E>,
    /// Step selection mode.
    #[serde(default)]
    pub sampling_mode: SamplingMode,
}

fn default_entropic_flatness() -> f64 {
    0.9
}

fn default_entropic_sweep_steps() -> u64 {
    10_000
}

impl<E> Default for EntropicParameters<E> {
    fn default() -> Self {
        Self {
            flatness: default_entropic_flatness(),
            sweep_steps: default_entropic_sweep_steps(),
            cutoffs: EnergyCutoffs::default(),
            sampling_mode: SamplingMode::default(),
        }
    }
}

impl<E> EntropicParameters<E> {
    /// Checks that the parameters describe a terminating run.
    pub fn validate(&self) -> Result<(), McsError> {
        if !(self.flatness > 0.0 && self.flatness <= 1.0) {
            return Err(McsError::config("es-flatness", "flatness", self.flatness));
        }
        if self.sweep_steps == 0 {
            return Err(McsError::config("es-sweep-steps", "sweep_steps", 0));
        }
        Ok(())
    }
}

/// Number of steps performed in each iteration of a fixed-length run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepSchedule {
    /// The same number of steps every iteration.
    Constant {
        /// Steps per iteration.
        steps: u64,
    },
    /// `initial + iteration * growth` steps.
    Linear {
        /// Steps of the first iteration.
        initial: u64,
        /// Steps added per iteration.
        growth: u64,
    },
    /// `initial * base^iteration` steps.
    PowerLaw {
        /// Steps of the first iteration.
        initial: u64,
        /// Growth base.
        #[serde(default = "default_power_law_base")]
        base: f64,
    },
}

fn default_power_law_base() -> f64 {
    2.0
}

impl StepSchedule {
    /// Steps to perform in iteration `iteration` (counting from zero).
    pub fn steps_for(&self, iteration: u64) -> u64 {
        match self {
            StepSchedule::Constant { steps } => *steps,
            StepSchedule::Linear { initial, growth } => {
                initial.saturating_add(growth.saturating_mul(iteration))
            }
            StepSchedule::PowerLaw { initial, base } => {
                let exponent = i32::try_from(iteration).unwrap_or(i32::MAX);
                (*initial as f64 * base.powi(exponent)).round() as u64
            }
        }
    }
}

/// Parameters of an optimal ensemble sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalEnsembleParameters<E> {
    /// Steps per sampling round of the first iteration; every iteration doubles it.
    #[serde(default = "default_initial_steps_per_iteration")]
    pub initial_steps_per_iteration: u64,
    /// Number of weight refinement iterations.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Energy at which a walker becomes negatively labelled; defaults to the
    /// smallest energy of the initial weights.
    #[serde(default)]
    pub minimal_energy: Option<E>,
    /// Energy at which a walker becomes positively labelled; defaults to the
    /// largest energy of the initial weights.
    #[serde(default)]
    pub maximal_energy: Option<E>,
    /// Energy window of the walk.
    #[serde(default)]
    pub cutoffs: EnergyCutoffs<E>,
    /// Wang-Landau run seeding the weights.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: WangLandauParameters<E>,
    /// Step selection mode.
    #[serde(default)]
    pub sampling_mode: SamplingMode,
}

fn default_initial_steps_per_iteration() -> u64 {
    1000
}

fn default_iterations() -> u64 {
    10_000
}

fn default_bootstrap<E>() -> WangLandauParameters<E> {
    WangLandauParameters {
        flatness: 0.8,
        modification_factor_initial: 1.0,
        modification_factor_final: 1e-6,
        modification_factor_multiplier: 0.5,
        sweep_steps: default_initial_steps_per_iteration(),
        ..WangLandauParameters::default()
    }
}

impl<E> Default for OptimalEnsembleParameters<E> {
    fn default() -> Self {
        Self {
            initial_steps_per_iteration: default_initial_steps_per_iteration(),
            iterations: default_iterations(),
            minimal_energy: None,
            maximal_energy: None,
            cutoffs: EnergyCutoffs::default(),
            bootstrap: default_bootstrap(),
            sampling_mode: SamplingMode::default(),
        }
    }
}

impl<E: EnergyValue> OptimalEnsembleParameters<E> {
    /// Checks that the parameters describe a terminating run.
    pub fn validate(&self) -> Result<(), McsError> {
        if self.initial_steps_per_iteration == 0 {
            return Err(McsError::config(
                "oes-initial-steps",
                "initial_steps_per_iteration",
                0,
            ));
        }
        if let (Some(minimal), Some(maximal)) = (self.minimal_energy, self.maximal_energy) {
            if minimal >= maximal {
                return Err(McsError::config(
                    "oes-bounds",
                    "minimal_energy",
                    format!("{minimal:?} >= {maximal:?}"),
                ));
            }
        }
        self.bootstrap.validate()
    }
}

#![deny(missing_docs)]
#![doc = "Core capabilities shared by every MCS sampler: configurations, steps, energies, randomness and errors."]

pub mod energy;
pub mod errors;
pub mod provenance;
pub mod rng;

pub use energy::{EnergyValue, RealEnergy};
pub use errors::{ErrorInfo, McsError};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RandomSource, RngHandle};

/// A proposed change of a [`Configuration`].
///
/// Steps are ephemeral values: they are either handed to
/// [`Configuration::commit`], which consumes them, or dropped unexecuted.
pub trait Step {
    /// Energy type of the configuration the step was proposed for.
    type Energy: EnergyValue;

    /// Energy difference the step would cause when committed.
    fn delta_e(&self) -> Self::Energy;

    /// Whether the step may be committed at all.
    fn is_executable(&self) -> bool {
        true
    }

    /// Ratio between the forward and backward selection probability.
    fn selection_probability_factor(&self) -> f64 {
        1.0
    }
}

/// State space sampled by the MCS algorithms.
pub trait Configuration {
    /// Energy type of the configuration.
    type Energy: EnergyValue;
    /// Step type proposed for this configuration.
    type Step: Step<Energy = Self::Energy>;

    /// Energy of the configuration, computed from scratch.
    fn energy(&self) -> Self::Energy;

    /// Draws a random step for the current state.
    fn propose_step<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Self::Step;

    /// Applies a step to the configuration.
    fn commit(&mut self, step: Self::Step);

    /// Every step available from the current state, if the configuration can
    /// enumerate them. Rejection-free sampling requires `Some`.
    fn all_steps(&self) -> Option<Vec<Self::Step>> {
        None
    }
}

//! Absolute state counting with Wang-Landau sampling.
//!
//! Wang-Landau only fixes `g(E)` up to a constant. Counting removes the
//! constant by singling out one reference configuration: the walk runs in
//! an extended energy space where the reference occupies its own bin
//! `(E_ref, 1)`, and every other configuration lands in `(E, 0)`. Since the
//! reference bin holds exactly one state, normalising it to `ln 1 = 0`
//! turns the relative estimate into absolute state counts.

use std::ops::{Add, Sub};

use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use mcs_engine::{CancellationToken, RunStatus};
use mcs_hist::{Binning, Histogram};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{EnergyCutoffs, WangLandauParameters};
use crate::wang_landau::WangLandau;

/// Energy extended by a flag that is `1` on the reference configuration.
///
/// Ordered by energy first, so the reference bin directly follows the
/// ordinary bin of the same energy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: EnergyValue"))]
pub struct CountedEnergy<E> {
    /// Energy of the configuration.
    pub energy: E,
    /// `1` on the reference configuration, `0` elsewhere.
    pub reference: i8,
}

impl<E> CountedEnergy<E> {
    /// Extended energy `(energy, reference)`.
    pub fn new(energy: E, reference: i8) -> Self {
        Self { energy, reference }
    }
}

impl<E: Add<Output = E>> Add for CountedEnergy<E> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.energy + other.energy, self.reference + other.reference)
    }
}

impl<E: Sub<Output = E>> Sub for CountedEnergy<E> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.energy - other.energy, self.reference - other.reference)
    }
}

impl<E: EnergyValue> EnergyValue for CountedEnergy<E> {
    fn to_f64(self) -> f64 {
        self.energy.to_f64()
    }

    fn from_f64(value: f64) -> Self {
        Self::new(E::from_f64(value), 0)
    }

    fn upper_limit() -> Self {
        Self::new(E::upper_limit(), 1)
    }
}

/// Step of a [`Counted`] configuration.
#[derive(Debug, Clone)]
pub struct CountedStep<S: Step> {
    step: S,
    delta: CountedEnergy<S::Energy>,
}

impl<S: Step> CountedStep<S> {
    /// Wrapped step.
    pub fn inner(&self) -> &S {
        &self.step
    }
}

impl<S: Step> Step for CountedStep<S> {
    type Energy = CountedEnergy<S::Energy>;

    fn delta_e(&self) -> Self::Energy {
        self.delta
    }

    fn is_executable(&self) -> bool {
        self.step.is_executable()
    }

    fn selection_probability_factor(&self) -> f64 {
        self.step.selection_probability_factor()
    }
}

/// Configuration that knows whether it equals a fixed reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "C: Serialize", deserialize = "C: Deserialize<'de>"))]
pub struct Counted<C: Configuration> {
    configuration: C,
    reference: C,
    reference_energy: C::Energy,
    energy: C::Energy,
    at_reference: bool,
}

impl<C> Counted<C>
where
    C: Configuration + Clone + PartialEq,
{
    /// Wraps `configuration`, flagging every visit of `reference`.
    pub fn new(configuration: C, reference: C) -> Self {
        Self {
            reference_energy: reference.energy(),
            energy: configuration.energy(),
            at_reference: configuration == reference,
            configuration,
            reference,
        }
    }

    /// Wrapped configuration.
    pub fn configuration(&self) -> &C {
        &self.configuration
    }

    /// The configuration counted as exactly one state.
    pub fn reference(&self) -> &C {
        &self.reference
    }

    /// Whether the wrapped configuration currently equals the reference.
    pub fn is_at_reference(&self) -> bool {
        self.at_reference
    }

    /// Gives up the wrapped configuration.
    pub fn into_inner(self) -> C {
        self.configuration
    }

    fn counted_step(&self, step: C::Step) -> CountedStep<C::Step>
    where
        C::Step: Clone,
    {
        let delta = step.delta_e();
        let lands = self.energy + delta == self.reference_energy && {
            let mut trial = self.configuration.clone();
            trial.commit(step.clone());
            trial == self.reference
        };
        CountedStep {
            delta: CountedEnergy::new(delta, i8::from(lands) - i8::from(self.at_reference)),
            step,
        }
    }
}

impl<C> Configuration for Counted<C>
where
    C: Configuration + Clone + PartialEq,
    C::Step: Clone,
{
    type Energy = CountedEnergy<C::Energy>;
    type Step = CountedStep<C::Step>;

    fn energy(&self) -> Self::Energy {
        CountedEnergy::new(self.energy, i8::from(self.at_reference))
    }

    fn propose_step<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Self::Step {
        self.counted_step(self.configuration.propose_step(rng))
    }

    fn commit(&mut self, step: Self::Step) {
        self.energy = self.energy + step.delta.energy;
        self.at_reference = i8::from(self.at_reference) + step.delta.reference == 1;
        self.configuration.commit(step.step);
    }

    fn all_steps(&self) -> Option<Vec<Self::Step>> {
        let steps = self.configuration.all_steps()?;
        Some(steps.into_iter().map(|step| self.counted_step(step)).collect())
    }
}

/// Wang-Landau run over [`Counted`] configurations that yields absolute
/// numbers of states.
pub struct MulticanonicalCounting<C, R>
where
    C: Configuration + Clone + PartialEq,
    C::Step: Clone,
{
    wang_landau: WangLandau<Counted<C>, R>,
    reference_energy: C::Energy,
}

impl<C, R> MulticanonicalCounting<C, R>
where
    C: Configuration + Clone + PartialEq,
    C::Step: Clone,
    R: RandomSource,
{
    /// Starts at `configuration`, counting `reference` (the starting
    /// configuration when `None`) as one state.
    ///
    /// Only identity binning keeps the reference bin apart, so any other
    /// binning is rejected. Cutoffs keep their meaning on the plain energy.
    pub fn new(
        parameters: WangLandauParameters<C::Energy>,
        configuration: C,
        reference: Option<C>,
        rng: R,
    ) -> Result<Self, McsError> {
        let reference = reference.unwrap_or_else(|| configuration.clone());
        let reference_energy = reference.energy();
        if !parameters.cutoffs.admits(reference_energy) {
            return Err(McsError::config(
                "counting-reference",
                "reference",
                format!("{reference_energy:?}"),
            ));
        }
        let parameters = counted_parameters(parameters)?;
        let wang_landau = WangLandau::new(parameters, Counted::new(configuration, reference), rng)?;
        Ok(Self {
            wang_landau,
            reference_energy,
        })
    }

    /// Runs the Wang-Landau schedule to its final modification factor.
    pub fn run(&mut self, token: &CancellationToken) -> RunStatus {
        let status = self.wang_landau.run(token);
        if !status.is_stopped() {
            info!(
                bins = self.wang_landau.log_density_of_states().len(),
                states = self.number_of_states(),
                "counting finished"
            );
        }
        status
    }
}

impl<C, R> MulticanonicalCounting<C, R>
where
    C: Configuration + Clone + PartialEq,
    C::Step: Clone,
{
    fn reference_key(&self) -> CountedEnergy<C::Energy> {
        CountedEnergy::new(self.reference_energy, 1)
    }

    /// `ln g` over the extended energies, zero on the reference bin.
    ///
    /// Left unshifted while the reference has not been visited.
    pub fn extended_log_density_of_states(&self) -> Histogram<CountedEnergy<C::Energy>, f64> {
        let log_density_of_states = self.wang_landau.log_density_of_states();
        let key = self.reference_key();
        let offset = if log_density_of_states.contains(key) {
            log_density_of_states.get(key)
        } else {
            0.0
        };
        log_density_of_states.map_values(|value| value - offset)
    }

    /// Absolute `ln g(E)` with the reference folded back into its energy.
    pub fn log_density_of_states(&self) -> Histogram<C::Energy, f64> {
        let extended = self.extended_log_density_of_states();
        let mut log_density_of_states: Histogram<C::Energy, f64> = extended
            .iter()
            .filter(|(key, _)| key.reference == 0)
            .map(|(key, value)| (key.energy, value))
            .collect();
        if extended.contains(self.reference_key()) {
            let others = log_density_of_states.contains(self.reference_energy).then(|| {
                log_density_of_states.get(self.reference_energy)
            });
            // ln(e^x + 1) without overflow.
            let merged = others.map_or(0.0, |x| x.max(0.0) + (-x.abs()).exp().ln_1p());
            log_density_of_states.set(self.reference_energy, merged);
        }
        log_density_of_states
    }

    /// Estimated total number of configurations.
    pub fn number_of_states(&self) -> f64 {
        self.extended_log_density_of_states()
            .iter()
            .map(|(_, value)| value.exp())
            .sum()
    }

    /// Underlying Wang-Landau run.
    pub fn wang_landau(&self) -> &WangLandau<Counted<C>, R> {
        &self.wang_landau
    }

    /// Underlying Wang-Landau run, e.g. to register hooks.
    pub fn wang_landau_mut(&mut self) -> &mut WangLandau<Counted<C>, R> {
        &mut self.wang_landau
    }

    /// Gives up the current configuration.
    pub fn into_configuration(self) -> C {
        self.wang_landau.into_configuration().into_inner()
    }
}

fn counted_parameters<E: EnergyValue>(
    parameters: WangLandauParameters<E>,
) -> Result<WangLandauParameters<CountedEnergy<E>>, McsError> {
    if !matches!(parameters.binning, Binning::Identity) {
        return Err(McsError::config(
            "counting-binning",
            "binning",
            "only identity binning separates the reference",
        ));
    }
    Ok(WangLandauParameters {
        flatness: parameters.flatness,
        modification_factor_initial: parameters.modification_factor_initial,
        modification_factor_final: parameters.modification_factor_final,
        modification_factor_multiplier: parameters.modification_factor_multiplier,
        sweep_steps: parameters.sweep_steps,
        reset_sweep_number: parameters.reset_sweep_number,
        one_over_t: parameters.one_over_t,
        cutoffs: EnergyCutoffs {
            lower: parameters.cutoffs.lower.map(|lower| CountedEnergy::new(lower, 0)),
            upper: parameters.cutoffs.upper.map(|upper| CountedEnergy::new(upper, 1)),
        },
        binning: Binning::Identity,
        sampling_mode: parameters.sampling_mode,
    })
}

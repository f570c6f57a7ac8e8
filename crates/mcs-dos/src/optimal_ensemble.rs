use std::mem;

use mcs_core::errors::ErrorInfo;
use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use mcs_engine::{
    AcceptanceRule, CancellationToken, HookEvent, Hooks, Metropolis, RunStatus, StepContext,
    StepCounters, Walker,
};
use mcs_hist::Histogram;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnergyCutoffs, OptimalEnsembleParameters};
use crate::wang_landau::{check_cutoffs, WangLandau};

/// Which boundary a walker visited last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalkerLabel {
    /// Neither boundary has been reached yet.
    #[default]
    Unlabelled,
    /// Last boundary reached was the minimal energy.
    Negative,
    /// Last boundary reached was the maximal energy.
    Positive,
}

/// Acceptance rule of optimal ensemble sampling.
///
/// Samples with `exp(w(E))` and collects residence times split by the
/// walker's label. A step leaving `[minimal_energy, maximal_energy]` is
/// always accepted; once executed it widens the interval and the new bin
/// inherits the weight of the boundary bin it crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: EnergyValue"))]
pub struct OptimalEnsembleRule<E> {
    weights: Histogram<E, f64>,
    sampled_weights: Histogram<E, f64>,
    positive: Histogram<E, f64>,
    negative: Histogram<E, f64>,
    label: WalkerLabel,
    minimal_energy: E,
    maximal_energy: E,
    cutoffs: EnergyCutoffs<E>,
}

impl<E: EnergyValue> OptimalEnsembleRule<E> {
    fn new(
        weights: Histogram<E, f64>,
        minimal_energy: E,
        maximal_energy: E,
        cutoffs: EnergyCutoffs<E>,
        energy: E,
    ) -> Self {
        let mut rule = Self {
            sampled_weights: weights.clone(),
            positive: Histogram::new(),
            negative: Histogram::new(),
            weights,
            label: WalkerLabel::Unlabelled,
            minimal_energy,
            maximal_energy,
            cutoffs,
        };
        rule.reset_counters();
        rule.relabel(energy);
        rule
    }

    fn reset_counters(&mut self) {
        self.positive.initialise_empty(&self.weights);
        self.negative.initialise_empty(&self.weights);
        self.sampled_weights = self.weights.clone();
    }

    fn relabel(&mut self, energy: E) {
        if energy <= self.minimal_energy {
            self.label = WalkerLabel::Negative;
        } else if energy >= self.maximal_energy {
            self.label = WalkerLabel::Positive;
        }
    }

    fn expand(&mut self, energy: E) {
        let boundary = if energy < self.minimal_energy {
            let boundary = self.minimal_energy;
            self.minimal_energy = energy;
            boundary
        } else if energy > self.maximal_energy {
            let boundary = self.maximal_energy;
            self.maximal_energy = energy;
            boundary
        } else {
            return;
        };
        let weight = self.weights.get(boundary);
        self.weights.set(energy, weight);
        self.sampled_weights.set(energy, weight);
        debug!(
            minimal = ?self.minimal_energy,
            maximal = ?self.maximal_energy,
            "optimal ensemble bounds expanded"
        );
    }

    fn set_bounds(&mut self, minimal_energy: E, maximal_energy: E) {
        for (bound, nearest) in [
            (minimal_energy, self.weights.min_key()),
            (maximal_energy, self.weights.max_key()),
        ] {
            if let (false, Some(nearest)) = (self.weights.contains(bound), nearest) {
                let weight = self.weights.get(nearest);
                self.weights.set(bound, weight);
            }
        }
        self.minimal_energy = minimal_energy;
        self.maximal_energy = maximal_energy;
        self.label = WalkerLabel::Unlabelled;
        self.reset_counters();
    }

    fn record(&mut self, energy: E, time: f64) {
        match self.label {
            WalkerLabel::Positive => self.positive.insert(energy, time),
            WalkerLabel::Negative => self.negative.insert(energy, time),
            WalkerLabel::Unlabelled => {}
        }
    }

    /// Whether the collected counters support a weight update.
    ///
    /// Both counters must hold residence time, each may have at most one empty
    /// bin and the positive fraction `pos / (pos + neg)` must not decrease
    /// with energy anywhere.
    pub fn is_recalculable(&self) -> bool {
        if self.positive.sum() <= 0.0 || self.negative.sum() <= 0.0 {
            return false;
        }
        if self.positive.count_value(0.0) > 1 || self.negative.count_value(0.0) > 1 {
            return false;
        }
        let fraction = self.fraction();
        let increasing = fraction
            .keys()
            .all(|energy| fraction.derivative(energy).map_or(true, |slope| slope >= 0.0));
        increasing
    }

    fn fraction(&self) -> Histogram<E, f64> {
        self.positive
            .iter()
            .filter_map(|(energy, positive)| {
                let total = positive + self.negative.get(energy);
                (total > 0.0).then_some((energy, positive / total))
            })
            .collect()
    }

    fn recalculate(&mut self) {
        let fraction = self.fraction();
        for (energy, _) in fraction.iter() {
            let total = self.positive.get(energy) + self.negative.get(energy);
            match fraction.derivative(energy) {
                Some(slope) if slope > 0.0 && total > 0.0 => {
                    *self.weights.get_mut(energy) += 0.5 * (slope.ln() - total.ln());
                }
                _ => {}
            }
        }
        if let Some(lowest) = self.weights.min_key() {
            self.weights.shift_bin_zero(lowest);
        }
    }

    /// Density of states implied by the counters and the weights they were
    /// sampled with, zero at the lowest energy.
    pub fn density_of_states(&self) -> Histogram<E, f64> {
        let mut log_density_of_states: Histogram<E, f64> = self
            .sampled_weights
            .iter()
            .filter_map(|(energy, weight)| {
                let total = self.positive.get(energy) + self.negative.get(energy);
                (total > 0.0).then(|| (energy, total.ln() - weight))
            })
            .collect();
        if let Some(lowest) = log_density_of_states.min_key() {
            log_density_of_states.shift_bin_zero(lowest);
        }
        log_density_of_states
    }

    /// Current weights.
    pub fn weights(&self) -> &Histogram<E, f64> {
        &self.weights
    }

    /// Residence times collected while positively labelled.
    pub fn positive(&self) -> &Histogram<E, f64> {
        &self.positive
    }

    /// Residence times collected while negatively labelled.
    pub fn negative(&self) -> &Histogram<E, f64> {
        &self.negative
    }

    /// Current walker label.
    pub fn label(&self) -> WalkerLabel {
        self.label
    }

    /// Current `(minimal_energy, maximal_energy)` interval.
    pub fn bounds(&self) -> (E, E) {
        (self.minimal_energy, self.maximal_energy)
    }
}

impl<S: Step> AcceptanceRule<S> for OptimalEnsembleRule<S::Energy> {
    fn acceptance_probability(
        &mut self,
        _step: &S,
        context: &mut StepContext<S::Energy>,
    ) -> f64 {
        let after = context.energy_after();
        if !self.cutoffs.admits(after) {
            return 0.0;
        }
        if after < self.minimal_energy || after > self.maximal_energy {
            return 1.0;
        }
        (self.weights.get(after) - self.weights.get(context.total_energy)).exp()
    }

    fn handle_executed(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        let energy = context.total_energy;
        self.expand(energy);
        self.relabel(energy);
        self.record(energy, time);
    }

    fn handle_rejected(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        self.record(context.total_energy, time);
    }
}

/// Metropolis rule confined to the energy cutoffs.
struct ConfinedMetropolis<'a, E> {
    metropolis: Metropolis,
    cutoffs: &'a EnergyCutoffs<E>,
}

impl<S: Step> AcceptanceRule<S> for ConfinedMetropolis<'_, S::Energy> {
    fn acceptance_probability(
        &mut self,
        step: &S,
        context: &mut StepContext<S::Energy>,
    ) -> f64 {
        if !self.cutoffs.admits(context.energy_after()) {
            return 0.0;
        }
        self.metropolis.acceptance_probability(step, context)
    }
}

/// Serializable snapshot of an [`OptimalEnsembleSampling`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, E: Serialize",
    deserialize = "C: Deserialize<'de>, E: EnergyValue"
))]
pub struct OptimalEnsembleState<C, E> {
    /// Configuration owned by the walker.
    pub configuration: C,
    /// Run parameters.
    pub parameters: OptimalEnsembleParameters<E>,
    /// Weights, counters and label.
    pub rule: OptimalEnsembleRule<E>,
    /// Completed iterations.
    pub iterations: u64,
    /// Step outcome totals.
    pub counters: StepCounters,
}

/// Optimal ensemble sampling: weights are refined so that the round-trip
/// current between the two energy boundaries is maximal.
pub struct OptimalEnsembleSampling<C: Configuration, R> {
    walker: Walker<C, R>,
    rule: OptimalEnsembleRule<C::Energy>,
    parameters: OptimalEnsembleParameters<C::Energy>,
    iterations: u64,
    hooks: Hooks<OptimalEnsembleSampling<C, R>>,
}

impl<C: Configuration, R: RandomSource> OptimalEnsembleSampling<C, R> {
    /// Seeds the weights with `-ln g(E)` from a Wang-Landau run using the
    /// `bootstrap` parameters, then continues with the same walker.
    ///
    /// The bootstrap run samples with the enclosing sampling mode and
    /// cutoffs. A stopped bootstrap is reported through the returned status;
    /// the sampler is still built from whatever estimate it reached.
    pub fn bootstrap(
        parameters: OptimalEnsembleParameters<C::Energy>,
        configuration: C,
        rng: R,
        token: &CancellationToken,
    ) -> Result<(Self, RunStatus), McsError> {
        parameters.validate()?;
        let mut bootstrap = parameters.bootstrap.clone();
        bootstrap.sampling_mode = parameters.sampling_mode;
        bootstrap.cutoffs = parameters.cutoffs.clone();
        let mut wang_landau = WangLandau::new(bootstrap, configuration, rng)?;
        let status = wang_landau.run(token);
        let weights = wang_landau.log_density_of_states().map_values(|value| -value);
        info!(
            bins = weights.len(),
            stopped = status.is_stopped(),
            "optimal ensemble weights bootstrapped"
        );
        let sampler = Self::from_walker(parameters, weights, wang_landau.into_walker())?;
        Ok((sampler, status))
    }

    /// Starts from explicit `weights`.
    pub fn with_weights(
        parameters: OptimalEnsembleParameters<C::Energy>,
        weights: Histogram<C::Energy, f64>,
        configuration: C,
        rng: R,
    ) -> Result<Self, McsError> {
        let walker = Walker::new(configuration, rng, parameters.sampling_mode)?;
        Self::from_walker(parameters, weights, walker)
    }

    fn from_walker(
        parameters: OptimalEnsembleParameters<C::Energy>,
        weights: Histogram<C::Energy, f64>,
        walker: Walker<C, R>,
    ) -> Result<Self, McsError> {
        parameters.validate()?;
        check_cutoffs(&parameters.cutoffs, walker.energy())?;
        let (Some(lowest), Some(highest)) = (weights.min_key(), weights.max_key()) else {
            return Err(McsError::InvalidRange(ErrorInfo::new(
                "oes-empty-weights",
                "weights hold no energies",
            )));
        };
        let minimal_energy = parameters.minimal_energy.unwrap_or(lowest);
        let maximal_energy = parameters.maximal_energy.unwrap_or(highest);
        if minimal_energy >= maximal_energy {
            return Err(McsError::config(
                "oes-bounds",
                "minimal_energy",
                format!("{minimal_energy:?} >= {maximal_energy:?}"),
            ));
        }
        let rule = OptimalEnsembleRule::new(
            weights,
            minimal_energy,
            maximal_energy,
            parameters.cutoffs.clone(),
            walker.energy(),
        );
        Ok(Self {
            walker,
            rule,
            parameters,
            iterations: 0,
            hooks: Hooks::new(),
        })
    }

    /// Rebuilds a run from a snapshot, drawing randomness from `rng`.
    pub fn restore(state: OptimalEnsembleState<C, C::Energy>, rng: R) -> Result<Self, McsError> {
        state.parameters.validate()?;
        let mut walker = Walker::new(state.configuration, rng, state.parameters.sampling_mode)?;
        walker.set_counters(state.counters);
        Ok(Self {
            walker,
            rule: state.rule,
            parameters: state.parameters,
            iterations: state.iterations,
            hooks: Hooks::new(),
        })
    }

    /// Performs one weight refinement.
    ///
    /// Iteration `i` (counted from zero) samples in rounds of
    /// `2^i * initial_steps_per_iteration` steps, repeated until the
    /// counters are recalculable; cancellation is polled after every round.
    pub fn iteration(&mut self, token: &CancellationToken) -> RunStatus {
        self.rule.reset_counters();
        let steps = self.steps_per_round();
        let mut rounds = 0u64;
        loop {
            self.walker.do_steps(&mut self.rule, steps);
            rounds += 1;
            if self.check_interrupt(token) {
                return RunStatus::Stopped;
            }
            if self.rule.is_recalculable() {
                break;
            }
        }
        self.rule.recalculate();
        self.iterations += 1;
        debug!(
            iteration = self.iterations,
            steps, rounds, "optimal ensemble weights updated"
        );
        self.emit(HookEvent::Iteration);
        RunStatus::Completed
    }

    /// Step budget of one sampling round of the next iteration.
    pub fn steps_per_round(&self) -> u64 {
        let factor = u32::try_from(self.iterations)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        self.parameters
            .initial_steps_per_iteration
            .saturating_mul(factor)
    }

    /// Locates the energy range with two canonical walks of `steps` steps
    /// each: at `beta_min` tracking the lowest energy, then at `beta_max`
    /// tracking the highest. Both become the new bounds and are stored in
    /// the parameters; counters and label start over.
    ///
    /// Pick a large positive `beta_min` and a large negative `beta_max`.
    /// The walker keeps the configuration the second walk ended in.
    pub fn find_minimal_maximal_energy(
        &mut self,
        beta_min: f64,
        beta_max: f64,
        steps: u64,
    ) -> Result<(C::Energy, C::Energy), McsError> {
        let minimal_energy = self.extremal_energy(beta_min, steps, Ord::min);
        let maximal_energy = self.extremal_energy(beta_max, steps, Ord::max);
        if minimal_energy >= maximal_energy {
            return Err(McsError::config(
                "oes-bounds",
                "minimal_energy",
                format!("{minimal_energy:?} >= {maximal_energy:?}"),
            ));
        }
        self.rule.set_bounds(minimal_energy, maximal_energy);
        self.rule.relabel(self.walker.energy());
        self.parameters.minimal_energy = Some(minimal_energy);
        self.parameters.maximal_energy = Some(maximal_energy);
        info!(
            minimal = ?minimal_energy,
            maximal = ?maximal_energy,
            "optimal ensemble bounds located"
        );
        Ok((minimal_energy, maximal_energy))
    }

    fn extremal_energy(
        &mut self,
        beta: f64,
        steps: u64,
        pick: fn(C::Energy, C::Energy) -> C::Energy,
    ) -> C::Energy {
        let mut rule = ConfinedMetropolis {
            metropolis: Metropolis::new(beta),
            cutoffs: &self.parameters.cutoffs,
        };
        let mut extreme = self.walker.energy();
        for _ in 0..steps {
            self.walker.step(&mut rule);
            extreme = pick(extreme, self.walker.energy());
        }
        extreme
    }

    /// Runs the remaining iterations.
    pub fn run(&mut self, token: &CancellationToken) -> RunStatus {
        while self.iterations < self.parameters.iterations {
            if self.iteration(token).is_stopped() {
                return RunStatus::Stopped;
            }
        }
        info!(
            iterations = self.iterations,
            "optimal ensemble sampling finished"
        );
        RunStatus::Completed
    }
}

impl<C: Configuration, R> OptimalEnsembleSampling<C, R> {
    /// Estimate of `ln g(E)` from the last iteration, zero at the lowest energy.
    pub fn density_of_states(&self) -> Histogram<C::Energy, f64> {
        self.rule.density_of_states()
    }

    /// Current weights.
    pub fn weights(&self) -> &Histogram<C::Energy, f64> {
        self.rule.weights()
    }

    /// Acceptance rule with counters and label.
    pub fn rule(&self) -> &OptimalEnsembleRule<C::Energy> {
        &self.rule
    }

    /// Completed iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Walker owning the configuration.
    pub fn walker(&self) -> &Walker<C, R> {
        &self.walker
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }

    /// Gives up ownership of the configuration.
    pub fn into_configuration(self) -> C {
        self.walker.into_configuration()
    }

    /// Captures everything needed to resume the run.
    pub fn snapshot(&self) -> OptimalEnsembleState<C, C::Energy>
    where
        C: Clone,
    {
        OptimalEnsembleState {
            configuration: self.walker.configuration().clone(),
            parameters: self.parameters.clone(),
            rule: self.rule.clone(),
            iterations: self.iterations,
            counters: self.walker.counters().clone(),
        }
    }

    fn emit(&mut self, event: HookEvent) {
        let mut hooks = mem::take(&mut self.hooks);
        hooks.fire(event, self);
        self.hooks = hooks;
    }

    fn check_interrupt(&mut self, token: &CancellationToken) -> bool {
        let mut hooks = mem::take(&mut self.hooks);
        let stop = hooks.check_interrupt(token, self);
        self.hooks = hooks;
        stop
    }
}

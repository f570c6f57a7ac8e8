use std::mem;

use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use mcs_engine::{
    AcceptanceRule, CancellationToken, HookEvent, Hooks, RunStatus, StepContext, StepCounters,
    Walker,
};
use mcs_hist::Histogram;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnergyCutoffs, EntropicParameters, StepSchedule};
use crate::wang_landau::{check_cutoffs, WangLandau};

/// Multicanonical acceptance driven by a fixed log density of states, plus the
/// incidence counter collected between refinements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: EnergyValue"))]
pub struct EntropicRule<E> {
    log_density_of_states: Histogram<E, f64>,
    incidence_counter: Histogram<E, f64>,
    cutoffs: EnergyCutoffs<E>,
}

impl<E: EnergyValue> EntropicRule<E> {
    /// Rule sampling with weights `exp(-log_density_of_states)`.
    pub fn new(log_density_of_states: Histogram<E, f64>, cutoffs: EnergyCutoffs<E>) -> Self {
        let mut incidence_counter = Histogram::new();
        incidence_counter.initialise_empty(&log_density_of_states);
        Self {
            log_density_of_states,
            incidence_counter,
            cutoffs,
        }
    }

    /// Current log density of states.
    pub fn log_density_of_states(&self) -> &Histogram<E, f64> {
        &self.log_density_of_states
    }

    /// Residence times since the last refinement.
    pub fn incidence_counter(&self) -> &Histogram<E, f64> {
        &self.incidence_counter
    }
}

impl<S: Step> AcceptanceRule<S> for EntropicRule<S::Energy> {
    fn acceptance_probability(
        &mut self,
        _step: &S,
        context: &mut StepContext<S::Energy>,
    ) -> f64 {
        let after = context.energy_after();
        if !self.cutoffs.admits(after) {
            return 0.0;
        }
        (self.log_density_of_states.get(context.total_energy)
            - self.log_density_of_states.get(after))
        .exp()
    }

    fn handle_executed(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        self.incidence_counter.insert(context.total_energy, time);
    }

    fn handle_rejected(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        self.incidence_counter.insert(context.total_energy, time);
    }
}

/// Serializable snapshot of an [`EntropicSampling`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, E: Serialize",
    deserialize = "C: Deserialize<'de>, E: EnergyValue"
))]
pub struct EntropicState<C, E> {
    /// Configuration owned by the walker.
    pub configuration: C,
    /// Run parameters.
    pub parameters: EntropicParameters<E>,
    /// Log density of states and incidence counter.
    pub rule: EntropicRule<E>,
    /// Completed sweeps.
    pub sweeps: u64,
    /// Flatness measured after the last sweep.
    pub last_flatness: f64,
    /// Step outcome totals.
    pub counters: StepCounters,
}

/// Entropic (multicanonical) refinement of a log density of states.
pub struct EntropicSampling<C: Configuration, R> {
    walker: Walker<C, R>,
    rule: EntropicRule<C::Energy>,
    parameters: EntropicParameters<C::Energy>,
    sweeps: u64,
    last_flatness: f64,
    hooks: Hooks<EntropicSampling<C, R>>,
}

impl<C: Configuration, R: RandomSource> EntropicSampling<C, R> {
    /// Starts from the estimate `log_density_of_states`.
    pub fn new(
        parameters: EntropicParameters<C::Energy>,
        log_density_of_states: Histogram<C::Energy, f64>,
        configuration: C,
        rng: R,
    ) -> Result<Self, McsError> {
        let walker = Walker::new(configuration, rng, parameters.sampling_mode)?;
        Self::from_walker(parameters, log_density_of_states, walker)
    }

    /// Continues the walk and the estimate of a finished Wang-Landau run.
    pub fn from_wang_landau(
        parameters: EntropicParameters<C::Energy>,
        wang_landau: WangLandau<C, R>,
    ) -> Result<Self, McsError> {
        let log_density_of_states = wang_landau.log_density_of_states().clone();
        Self::from_walker(parameters, log_density_of_states, wang_landau.into_walker())
    }

    fn from_walker(
        parameters: EntropicParameters<C::Energy>,
        log_density_of_states: Histogram<C::Energy, f64>,
        walker: Walker<C, R>,
    ) -> Result<Self, McsError> {
        parameters.validate()?;
        check_cutoffs(&parameters.cutoffs, walker.energy())?;
        let rule = EntropicRule::new(log_density_of_states, parameters.cutoffs.clone());
        Ok(Self {
            walker,
            rule,
            parameters,
            sweeps: 0,
            last_flatness: 0.0,
            hooks: Hooks::new(),
        })
    }

    /// Rebuilds a run from a snapshot, drawing randomness from `rng`.
    pub fn restore(state: EntropicState<C, C::Energy>, rng: R) -> Result<Self, McsError> {
        state.parameters.validate()?;
        let mut walker = Walker::new(state.configuration, rng, state.parameters.sampling_mode)?;
        walker.set_counters(state.counters);
        Ok(Self {
            walker,
            rule: state.rule,
            parameters: state.parameters,
            sweeps: state.sweeps,
            last_flatness: state.last_flatness,
            hooks: Hooks::new(),
        })
    }

    /// Samples `steps` steps with the current weights and folds the collected
    /// incidence counter into the log density of states.
    ///
    /// The sweep hook sees the incidence counter of the finished sweep; the
    /// counter is zeroed afterwards and the estimate shifted to zero at its
    /// lowest energy.
    pub fn sweep(&mut self, steps: u64, token: &CancellationToken) -> RunStatus {
        self.walker.do_steps(&mut self.rule, steps);
        self.sweeps += 1;
        let visits: Vec<_> = self
            .rule
            .incidence_counter
            .iter()
            .filter(|(_, count)| *count > 0.0)
            .collect();
        for (energy, count) in visits {
            self.rule.log_density_of_states.insert(energy, count.ln());
        }
        self.last_flatness = self.rule.incidence_counter.flatness();
        debug!(
            sweep = self.sweeps,
            flatness = self.last_flatness,
            "entropic sweep"
        );

        self.emit(HookEvent::Sweep);
        let stop = self.check_interrupt(token);
        self.rule.incidence_counter.set_all(0.0);
        if let Some(lowest) = self.rule.log_density_of_states.min_key() {
            self.rule.log_density_of_states.shift_bin_zero(lowest);
        }
        if stop {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        }
    }

    /// Sweeps with `sweep_steps` steps until a sweep reaches the flatness threshold.
    pub fn run(&mut self, token: &CancellationToken) -> RunStatus {
        loop {
            if self.sweep(self.parameters.sweep_steps, token).is_stopped() {
                return RunStatus::Stopped;
            }
            if self.last_flatness >= self.parameters.flatness {
                info!(
                    sweeps = self.sweeps,
                    flatness = self.last_flatness,
                    "entropic sampling converged"
                );
                return RunStatus::Completed;
            }
        }
    }

    /// Runs exactly `iterations` sweeps with step counts from `schedule`.
    pub fn run_iterations(
        &mut self,
        iterations: u64,
        schedule: &StepSchedule,
        token: &CancellationToken,
    ) -> RunStatus {
        for iteration in 0..iterations {
            let steps = schedule.steps_for(iteration);
            if self.sweep(steps, token).is_stopped() {
                return RunStatus::Stopped;
            }
        }
        info!(
            iterations,
            flatness = self.last_flatness,
            "entropic iterations finished"
        );
        RunStatus::Completed
    }
}

impl<C: Configuration, R> EntropicSampling<C, R> {
    /// Current log density of states.
    pub fn log_density_of_states(&self) -> &Histogram<C::Energy, f64> {
        &self.rule.log_density_of_states
    }

    /// Incidence counter of the sweep in progress.
    pub fn incidence_counter(&self) -> &Histogram<C::Energy, f64> {
        &self.rule.incidence_counter
    }

    /// Flatness measured after the last sweep.
    pub fn last_flatness(&self) -> f64 {
        self.last_flatness
    }

    /// Completed sweeps.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
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
    pub fn snapshot(&self) -> EntropicState<C, C::Energy>
    where
        C: Clone,
    {
        EntropicState {
            configuration: self.walker.configuration().clone(),
            parameters: self.parameters.clone(),
            rule: self.rule.clone(),
            sweeps: self.sweeps,
            last_flatness: self.last_flatness,
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

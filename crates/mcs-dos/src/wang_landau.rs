use std::mem;

use mcs_core::errors::ErrorInfo;
use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use mcs_engine::{
    AcceptanceRule, CancellationToken, HookEvent, Hooks, RunStatus, StepContext, StepCounters,
    Walker,
};
use mcs_hist::{Binning, Histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnergyCutoffs, WangLandauParameters};

/// Wang-Landau acceptance together with the histograms it refines.
///
/// `log_density_of_states` holds the running estimate of `ln g(E)`; the
/// incidence counter records how long the walk resided in every bin since
/// the last reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: EnergyValue"))]
pub struct WangLandauRule<E> {
    log_density_of_states: Histogram<E, f64>,
    incidence_counter: Histogram<E, f64>,
    modification_factor: f64,
    cutoffs: EnergyCutoffs<E>,
}

impl<E: EnergyValue> WangLandauRule<E> {
    /// Empty histograms using `binning`, refined by `modification_factor`.
    pub fn new(binning: Binning<E>, cutoffs: EnergyCutoffs<E>, modification_factor: f64) -> Self {
        Self {
            log_density_of_states: Histogram::with_binning(binning.clone()),
            incidence_counter: Histogram::with_binning(binning),
            modification_factor,
            cutoffs,
        }
    }

    /// Running estimate of `ln g(E)`.
    pub fn log_density_of_states(&self) -> &Histogram<E, f64> {
        &self.log_density_of_states
    }

    /// Residence times since the last reset.
    pub fn incidence_counter(&self) -> &Histogram<E, f64> {
        &self.incidence_counter
    }

    /// Current logarithmic modification factor.
    pub fn modification_factor(&self) -> f64 {
        self.modification_factor
    }

    /// Energy window of the walk.
    pub fn cutoffs(&self) -> &EnergyCutoffs<E> {
        &self.cutoffs
    }

    fn refine(&mut self, energy: E, time: f64) {
        let increment = self.modification_factor * time;
        if self.log_density_of_states.contains(energy) {
            *self.log_density_of_states.get_mut(energy) += increment.min(1.0);
        } else {
            // A freshly discovered bin starts level with the least visited one.
            let floor = self
                .log_density_of_states
                .min_value()
                .map_or(0.0, |(_, value)| value);
            self.log_density_of_states.set(energy, floor + increment);
        }
    }
}

impl<S: Step> AcceptanceRule<S> for WangLandauRule<S::Energy> {
    fn acceptance_probability(
        &mut self,
        _step: &S,
        context: &mut StepContext<S::Energy>,
    ) -> f64 {
        let after = context.energy_after();
        if !self.cutoffs.admits(after) {
            return 0.0;
        }
        if !self.log_density_of_states.contains(after) {
            return 1.0;
        }
        (self.log_density_of_states.get(context.total_energy)
            - self.log_density_of_states.get(after))
        .exp()
    }

    fn handle_executed(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        self.refine(context.total_energy, time);
        self.incidence_counter
            .insert(context.total_energy, time.min(1.0));
    }

    fn handle_rejected(&mut self, time: f64, context: &mut StepContext<S::Energy>) {
        self.log_density_of_states
            .insert(context.total_energy, self.modification_factor * time);
        self.incidence_counter.insert(context.total_energy, time);
    }
}

/// Annealing regime of the modification factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    /// Multiply by the configured factor whenever the incidence counter is flat.
    #[default]
    Multiplicative,
    /// Follow `1/t` after every sweep.
    InverseTime,
}

/// Serializable snapshot of a [`WangLandau`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, E: Serialize",
    deserialize = "C: Deserialize<'de>, E: EnergyValue"
))]
pub struct WangLandauState<C, E> {
    /// Configuration owned by the walker.
    pub configuration: C,
    /// Run parameters.
    pub parameters: WangLandauParameters<E>,
    /// Histograms and current modification factor.
    pub rule: WangLandauRule<E>,
    /// Completed sweeps.
    pub sweeps: u64,
    /// Step outcome totals.
    pub counters: StepCounters,
    /// Active annealing regime.
    pub schedule: Schedule,
}

/// Wang-Landau estimation of the density of states of one configuration.
pub struct WangLandau<C: Configuration, R> {
    walker: Walker<C, R>,
    rule: WangLandauRule<C::Energy>,
    parameters: WangLandauParameters<C::Energy>,
    sweeps: u64,
    schedule: Schedule,
    hooks: Hooks<WangLandau<C, R>>,
}

impl<C: Configuration, R: RandomSource> WangLandau<C, R> {
    /// Takes ownership of `configuration`.
    ///
    /// Fails on invalid parameters and when the initial energy lies outside
    /// the cutoffs.
    pub fn new(
        parameters: WangLandauParameters<C::Energy>,
        configuration: C,
        rng: R,
    ) -> Result<Self, McsError> {
        let walker = Walker::new(configuration, rng, parameters.sampling_mode)?;
        Self::from_walker(parameters, walker)
    }

    /// Continues with an existing walker, keeping its configuration and counters.
    pub fn from_walker(
        parameters: WangLandauParameters<C::Energy>,
        walker: Walker<C, R>,
    ) -> Result<Self, McsError> {
        parameters.validate()?;
        check_cutoffs(&parameters.cutoffs, walker.energy())?;
        let rule = WangLandauRule::new(
            parameters.binning.clone(),
            parameters.cutoffs.clone(),
            parameters.modification_factor_initial,
        );
        Ok(Self {
            walker,
            rule,
            parameters,
            sweeps: 0,
            schedule: Schedule::Multiplicative,
            hooks: Hooks::new(),
        })
    }

    /// Rebuilds a run from a snapshot, drawing randomness from `rng`.
    pub fn restore(state: WangLandauState<C, C::Energy>, rng: R) -> Result<Self, McsError> {
        let WangLandauState {
            configuration,
            parameters,
            rule,
            sweeps,
            counters,
            schedule,
        } = state;
        parameters.validate()?;
        let mut walker = Walker::new(configuration, rng, parameters.sampling_mode)?;
        walker.set_counters(counters);
        Ok(Self {
            walker,
            rule,
            parameters,
            sweeps,
            schedule,
            hooks: Hooks::new(),
        })
    }

    /// Performs `number` steps without any bookkeeping beyond the histograms.
    pub fn do_steps(&mut self, number: u64) {
        self.walker.do_steps(&mut self.rule, number);
    }

    /// Performs one sweep and fires the sweep hooks.
    ///
    /// With `reset_sweep_number = n > 0` the incidence counter is cleared at
    /// the start of every sweep that follows a multiple of `n`, so the
    /// flatness test after a sweep always sees the residence times of at
    /// least that sweep.
    pub fn sweep(&mut self) {
        let reset = self.parameters.reset_sweep_number;
        if reset > 0 && self.sweeps > 0 && self.sweeps % reset == 0 {
            self.rule.incidence_counter.set_all(0.0);
        }
        self.walker
            .do_steps(&mut self.rule, self.parameters.sweep_steps);
        self.sweeps += 1;
        debug!(
            sweep = self.sweeps,
            bins = self.rule.log_density_of_states.len(),
            flatness = self.rule.incidence_counter.flatness(),
            "wang-landau sweep"
        );
        self.emit(HookEvent::Sweep);
    }

    /// Sweeps until the incidence counter is flat or `max_sweeps` were done.
    ///
    /// Returns whether the counter is flat.
    pub fn run_sweeps(&mut self, max_sweeps: u64) -> bool {
        for _ in 0..max_sweeps {
            if self.is_flat() {
                return true;
            }
            self.sweep();
        }
        self.is_flat()
    }

    /// Sweeps until the incidence counter is flat, polling `token` after
    /// every sweep.
    pub fn run_to_flatness(&mut self, token: &CancellationToken) -> RunStatus {
        while !self.is_flat() {
            self.sweep();
            if self.check_interrupt(token) {
                return RunStatus::Stopped;
            }
        }
        RunStatus::Completed
    }

    /// Anneals the modification factor down to its final value.
    ///
    /// Each stage sweeps to flatness, resets the incidence counter, shifts the
    /// log density of states so its lowest-energy bin reads zero and lowers the
    /// modification factor. With `one_over_t` enabled the run switches to
    /// `f = 1/t` as soon as the multiplicative schedule would fall below it,
    /// and from then on lowers `f` after every sweep.
    pub fn run(&mut self, token: &CancellationToken) -> RunStatus {
        info!(
            initial = self.rule.modification_factor,
            target = self.parameters.modification_factor_final,
            "wang-landau run started"
        );
        while self.rule.modification_factor > self.parameters.modification_factor_final {
            match self.schedule {
                Schedule::Multiplicative => {
                    if self.run_to_flatness(token).is_stopped() {
                        return RunStatus::Stopped;
                    }
                    self.reset_incidence_counter();
                    self.shift_log_density_of_states();
                    let next = self.rule.modification_factor
                        * self.parameters.modification_factor_multiplier;
                    let inverse_time = 1.0 / self.elapsed_time();
                    if self.parameters.one_over_t && next <= inverse_time {
                        self.schedule = Schedule::InverseTime;
                        self.rule.modification_factor =
                            inverse_time.min(self.rule.modification_factor);
                        info!(
                            modification_factor = self.rule.modification_factor,
                            sweeps = self.sweeps,
                            "switched to 1/t schedule"
                        );
                    } else {
                        self.rule.modification_factor = next;
                        info!(
                            modification_factor = next,
                            sweeps = self.sweeps,
                            "modification factor lowered"
                        );
                    }
                    self.emit(HookEvent::ModificationFactor);
                }
                Schedule::InverseTime => {
                    self.sweep();
                    if self.check_interrupt(token) {
                        return RunStatus::Stopped;
                    }
                    self.rule.modification_factor =
                        (1.0 / self.elapsed_time()).min(self.rule.modification_factor);
                    self.emit(HookEvent::ModificationFactor);
                }
            }
        }
        self.shift_log_density_of_states();
        info!(sweeps = self.sweeps, "wang-landau run finished");
        RunStatus::Completed
    }

    /// Exchanges configurations with `other`; histograms stay in place.
    pub fn swap_configurations(&mut self, other: &mut Self) {
        self.walker.swap_configurations(&mut other.walker);
    }
}

impl<C: Configuration, R> WangLandau<C, R> {
    /// Whether the incidence counter reached the flatness threshold.
    pub fn is_flat(&self) -> bool {
        self.rule.incidence_counter.flatness() >= self.parameters.flatness
    }

    /// Simulation time per visited bin, the `t` of the 1/t schedule.
    pub fn elapsed_time(&self) -> f64 {
        let bins = self.rule.log_density_of_states.len().max(1);
        self.walker.counters().time / bins as f64
    }

    /// Zeroes every incidence bin while keeping the visited energies.
    pub fn reset_incidence_counter(&mut self) {
        self.rule.incidence_counter.set_all(0.0);
    }

    /// Shifts the log density of states so its lowest-energy bin reads zero.
    pub fn shift_log_density_of_states(&mut self) {
        if let Some(lowest) = self.rule.log_density_of_states.min_key() {
            self.rule.log_density_of_states.shift_bin_zero(lowest);
        }
    }

    /// Overrides the modification factor.
    pub fn set_modification_factor(&mut self, modification_factor: f64) {
        self.rule.modification_factor = modification_factor;
    }

    /// Replaces the log density of states, for example after merging replicas.
    pub fn set_log_density_of_states(&mut self, log_density_of_states: Histogram<C::Energy, f64>) {
        self.rule.log_density_of_states = log_density_of_states;
    }

    /// Current logarithmic modification factor.
    pub fn modification_factor(&self) -> f64 {
        self.rule.modification_factor
    }

    /// Running estimate of `ln g(E)`.
    pub fn log_density_of_states(&self) -> &Histogram<C::Energy, f64> {
        &self.rule.log_density_of_states
    }

    /// Residence times since the last reset.
    pub fn incidence_counter(&self) -> &Histogram<C::Energy, f64> {
        &self.rule.incidence_counter
    }

    /// Completed sweeps.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Active annealing regime.
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Run parameters.
    pub fn parameters(&self) -> &WangLandauParameters<C::Energy> {
        &self.parameters
    }

    /// Walker owning the configuration.
    pub fn walker(&self) -> &Walker<C, R> {
        &self.walker
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }

    /// Gives up the walker, dropping the histograms.
    pub fn into_walker(self) -> Walker<C, R> {
        self.walker
    }

    /// Gives up ownership of the configuration.
    pub fn into_configuration(self) -> C {
        self.walker.into_configuration()
    }

    /// Captures everything needed to resume the run.
    pub fn snapshot(&self) -> WangLandauState<C, C::Energy>
    where
        C: Clone,
    {
        WangLandauState {
            configuration: self.walker.configuration().clone(),
            parameters: self.parameters.clone(),
            rule: self.rule.clone(),
            sweeps: self.sweeps,
            counters: self.walker.counters().clone(),
            schedule: self.schedule,
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

pub(crate) fn check_cutoffs<E: EnergyValue>(
    cutoffs: &EnergyCutoffs<E>,
    energy: E,
) -> Result<(), McsError> {
    if cutoffs.admits(energy) {
        return Ok(());
    }
    Err(McsError::EnergyOutOfRange(
        ErrorInfo::new("energy-outside-cutoffs", "initial energy lies outside the cutoffs")
            .with_context("energy", format!("{energy:?}"))
            .with_context("lower", format!("{:?}", cutoffs.lower))
            .with_context("upper", format!("{:?}", cutoffs.upper)),
    ))
}

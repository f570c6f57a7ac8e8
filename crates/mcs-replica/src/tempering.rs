use std::mem;

use mcs_core::errors::ErrorInfo;
use mcs_core::{Configuration, EnergyValue, McsError, RandomSource};
use mcs_engine::{CancellationToken, HookEvent, Hooks, Metropolis, RunStatus, StepCounters, Walker};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{LadderConfig, TemperingParameters};
use crate::exchange_log::ExchangeLog;
use crate::parallel::Executor;

/// Metropolis acceptance for swapping the configurations of two replicas.
///
/// `exp[(beta_a - beta_b)(E_a - E_b)]`, clamped to 1.
pub fn exchange_acceptance(beta_a: f64, energy_a: f64, beta_b: f64, energy_b: f64) -> f64 {
    ((beta_a - beta_b) * (energy_a - energy_b)).exp().min(1.0)
}

/// Derives an independent stream for one replica from the coordinator stream.
pub(crate) fn replica_stream<R: RandomSource + Clone>(rng: &mut R) -> R {
    let mut stream = rng.clone();
    stream.set_seed(rng.random_uint(0, u32::MAX));
    stream
}

#[derive(Debug)]
struct Replica<C: Configuration, R> {
    walker: Walker<C, R>,
    rule: Metropolis,
}

/// Serializable snapshot of a [`Tempering`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperingState<C> {
    /// Configurations, one per slot, coldest first.
    pub configurations: Vec<C>,
    /// Inverse temperatures, one per slot.
    pub betas: Vec<f64>,
    /// Run schedule.
    pub parameters: TemperingParameters,
    /// Step outcome totals per slot.
    pub counters: Vec<StepCounters>,
    /// Exchange outcomes.
    pub log: ExchangeLog,
    /// Measurements taken.
    pub measurements: u64,
}

/// Parallel or serial tempering over an ordered ladder of inverse temperatures.
///
/// Slots keep their inverse temperature; configurations travel between
/// slots through accepted exchanges.
pub struct Tempering<C: Configuration, R> {
    replicas: Vec<Replica<C, R>>,
    parameters: TemperingParameters,
    executor: Executor,
    rng: R,
    log: ExchangeLog,
    measurements: u64,
    hooks: Hooks<Tempering<C, R>>,
}

impl<C, R> Tempering<C, R>
where
    C: Configuration + Send,
    R: RandomSource + Clone + Send,
{
    /// One slot per entry of `betas`, filled with `configurations` in order.
    ///
    /// Fails with [`McsError::InvalidRange`] on an empty set or mismatched
    /// counts and with [`McsError::Config`] on an inverse temperature that is
    /// not finite.
    pub fn new(
        parameters: TemperingParameters,
        betas: Vec<f64>,
        configurations: Vec<C>,
        mut rng: R,
    ) -> Result<Self, McsError> {
        parameters.validate()?;
        if configurations.is_empty() {
            return Err(McsError::InvalidRange(ErrorInfo::new(
                "tempering-empty",
                "no configurations to temper",
            )));
        }
        if configurations.len() != betas.len() {
            return Err(McsError::count_mismatch(
                "tempering-count",
                betas.len(),
                configurations.len(),
            ));
        }
        if let Some(beta) = betas.iter().find(|beta| !beta.is_finite()) {
            return Err(McsError::config("tempering-beta", "betas", beta));
        }
        let executor = Executor::new(&parameters.execution)?;
        let mut replicas = Vec::with_capacity(betas.len());
        for (configuration, beta) in configurations.into_iter().zip(betas) {
            let walker = Walker::new(
                configuration,
                replica_stream(&mut rng),
                parameters.sampling_mode,
            )?;
            replicas.push(Replica {
                walker,
                rule: Metropolis::new(beta),
            });
        }
        Ok(Self {
            replicas,
            parameters,
            executor,
            rng,
            log: ExchangeLog::default(),
            measurements: 0,
            hooks: Hooks::new(),
        })
    }

    /// Builds the inverse temperatures from `ladder`.
    pub fn with_ladder(
        parameters: TemperingParameters,
        ladder: &LadderConfig,
        configurations: Vec<C>,
        rng: R,
    ) -> Result<Self, McsError> {
        ladder.validate()?;
        Self::new(parameters, ladder.inverse_temperatures(), configurations, rng)
    }

    /// Rebuilds a run from a snapshot, deriving replica streams from `rng`.
    pub fn restore(state: TemperingState<C>, rng: R) -> Result<Self, McsError> {
        if state.counters.len() != state.configurations.len() {
            return Err(McsError::count_mismatch(
                "tempering-counters",
                state.configurations.len(),
                state.counters.len(),
            ));
        }
        let mut tempering = Self::new(state.parameters, state.betas, state.configurations, rng)?;
        for (replica, counters) in tempering.replicas.iter_mut().zip(state.counters) {
            replica.walker.set_counters(counters);
        }
        tempering.log = state.log;
        tempering.measurements = state.measurements;
        Ok(tempering)
    }

    /// Advances every replica by `steps` at its own inverse temperature.
    pub fn do_steps(&mut self, steps: u64) {
        self.executor.for_each_mut(&mut self.replicas, |replica| {
            replica.walker.do_steps(&mut replica.rule, steps);
        });
    }

    /// Attempts one exchange between a random pair of neighbouring slots.
    ///
    /// Returns whether the configurations were swapped. With a single slot the
    /// attempt is logged as a rejection at boundary 0.
    pub fn exchange(&mut self) -> bool {
        let slots = self.replicas.len();
        if slots < 2 {
            self.log.record(0, false);
            self.emit(HookEvent::Exchange);
            return false;
        }
        let boundary = self.rng.random_uint(0, (slots - 2) as u32) as usize;
        let (lower, upper) = self.replicas.split_at_mut(boundary + 1);
        let (cold, hot) = (&mut lower[boundary], &mut upper[0]);
        let probability = exchange_acceptance(
            cold.rule.beta,
            cold.walker.energy().to_f64(),
            hot.rule.beta,
            hot.walker.energy().to_f64(),
        );
        let accepted = probability >= 1.0 || self.rng.random_double() < probability;
        if accepted {
            cold.walker.swap_configurations(&mut hot.walker);
        }
        self.log.record(boundary, accepted);
        debug!(boundary, probability, accepted, "tempering exchange");
        self.emit(HookEvent::Exchange);
        accepted
    }

    /// Performs `steps` steps per replica in batches separated by exchanges.
    pub fn advance(&mut self, steps: u64) {
        let interval = self.parameters.steps_between_replica_exchange;
        let mut remaining = steps;
        while remaining > 0 {
            let batch = remaining.min(interval);
            self.do_steps(batch);
            self.exchange();
            remaining -= batch;
        }
    }

    /// Relaxes, then takes `measurement_number` measurements.
    ///
    /// `observe(slot, configuration)` is evaluated for every slot at every
    /// measurement; the result holds one row per measurement, coldest slot
    /// first. Cancellation is polled after the relaxation and after every
    /// measurement.
    pub fn run<O>(
        &mut self,
        token: &CancellationToken,
        mut observe: impl FnMut(usize, &C) -> O,
    ) -> (RunStatus, Vec<Vec<O>>) {
        let mut rows = Vec::with_capacity(self.parameters.measurement_number as usize);
        info!(
            replicas = self.replicas.len(),
            threads = self.executor.threads(),
            "tempering run started"
        );
        self.advance(self.parameters.relaxation_steps);
        if self.check_interrupt(token) {
            return (RunStatus::Stopped, rows);
        }
        for _ in 0..self.parameters.measurement_number {
            self.advance(self.parameters.steps_between_measurement);
            let row = self
                .replicas
                .iter()
                .enumerate()
                .map(|(slot, replica)| observe(slot, replica.walker.configuration()))
                .collect();
            rows.push(row);
            self.measurements += 1;
            self.emit(HookEvent::Measurement);
            if self.check_interrupt(token) {
                return (RunStatus::Stopped, rows);
            }
        }
        info!(
            measurements = self.measurements,
            exchanges = self.log.total_attempts(),
            "tempering run finished"
        );
        (RunStatus::Completed, rows)
    }
}

impl<C: Configuration, R> Tempering<C, R> {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Whether the coordinator holds no slots.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Inverse temperatures, one per slot.
    pub fn betas(&self) -> Vec<f64> {
        self.replicas.iter().map(|replica| replica.rule.beta).collect()
    }

    /// Installs new inverse temperatures; configurations stay in their slots.
    pub fn set_betas(&mut self, betas: &[f64]) -> Result<(), McsError> {
        if betas.len() != self.replicas.len() {
            return Err(McsError::count_mismatch(
                "tempering-count",
                self.replicas.len(),
                betas.len(),
            ));
        }
        if let Some(beta) = betas.iter().find(|beta| !beta.is_finite()) {
            return Err(McsError::config("tempering-beta", "betas", beta));
        }
        for (replica, &beta) in self.replicas.iter_mut().zip(betas) {
            replica.rule.beta = beta;
        }
        Ok(())
    }

    /// Clears the exchange statistics.
    pub fn reset_exchange_log(&mut self) {
        self.log = ExchangeLog::default();
    }

    /// Tracked energies, one per slot.
    pub fn energies(&self) -> Vec<C::Energy> {
        self.replicas
            .iter()
            .map(|replica| replica.walker.energy())
            .collect()
    }

    /// Walker of `slot`.
    pub fn walker(&self, slot: usize) -> Option<&Walker<C, R>> {
        self.replicas.get(slot).map(|replica| &replica.walker)
    }

    /// Exchange outcomes so far.
    pub fn exchange_log(&self) -> &ExchangeLog {
        &self.log
    }

    /// Measurements taken so far.
    pub fn measurements(&self) -> u64 {
        self.measurements
    }

    /// Run schedule.
    pub fn parameters(&self) -> &TemperingParameters {
        &self.parameters
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }

    /// Gives up the configurations, coldest slot first.
    pub fn into_configurations(self) -> Vec<C> {
        self.replicas
            .into_iter()
            .map(|replica| replica.walker.into_configuration())
            .collect()
    }

    /// Captures everything needed to resume the run.
    pub fn snapshot(&self) -> TemperingState<C>
    where
        C: Clone,
    {
        TemperingState {
            configurations: self
                .replicas
                .iter()
                .map(|replica| replica.walker.configuration().clone())
                .collect(),
            betas: self.betas(),
            parameters: self.parameters.clone(),
            counters: self
                .replicas
                .iter()
                .map(|replica| replica.walker.counters().clone())
                .collect(),
            log: self.log.clone(),
            measurements: self.measurements,
        }
    }

    fn emit(&mut self, event: HookEvent) {
        let mut hooks = mem::take(&mut self.hooks);
        hooks.fire(event, self);
        self.hooks = hooks;
    }

    pub(crate) fn check_interrupt(&mut self, token: &CancellationToken) -> bool {
        let mut hooks = mem::take(&mut self.hooks);
        let stop = hooks.check_interrupt(token, self);
        self.hooks = hooks;
        stop
    }
}

use std::mem;

use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MetropolisParameters;
use crate::control::{CancellationToken, HookEvent, Hooks, RunStatus};
use crate::engine::{AcceptanceRule, StepContext, Walker};

/// Boltzmann acceptance `exp(-beta * delta_E)` at a fixed inverse temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metropolis {
    /// Inverse temperature.
    pub beta: f64,
}

impl Metropolis {
    /// Rule for inverse temperature `beta`.
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }
}

impl<S: Step> AcceptanceRule<S> for Metropolis {
    fn acceptance_probability(&mut self, _step: &S, context: &mut StepContext<S::Energy>) -> f64 {
        (-self.beta * context.delta_e.to_f64()).exp()
    }
}

/// Canonical sampling of one configuration with periodic measurements.
pub struct MetropolisSimulation<C: Configuration, R> {
    walker: Walker<C, R>,
    parameters: MetropolisParameters,
    measurements: u64,
    hooks: Hooks<MetropolisSimulation<C, R>>,
}

impl<C: Configuration, R: RandomSource> MetropolisSimulation<C, R> {
    /// Takes ownership of `configuration`.
    pub fn new(
        configuration: C,
        rng: R,
        parameters: MetropolisParameters,
    ) -> Result<Self, McsError> {
        if parameters.measurement_number > 0 && parameters.steps_between_measurement == 0 {
            return Err(McsError::config(
                "metropolis-steps",
                "steps_between_measurement",
                parameters.steps_between_measurement,
            ));
        }
        let walker = Walker::new(configuration, rng, parameters.sampling_mode)?;
        Ok(Self {
            walker,
            parameters,
            measurements: 0,
            hooks: Hooks::new(),
        })
    }

    /// Performs `number` steps at inverse temperature `beta`.
    pub fn do_steps(&mut self, beta: f64, number: u64) {
        self.walker.do_steps(&mut Metropolis::new(beta), number);
    }

    /// Relaxes at `beta`, then takes `measurement_number` measurements.
    ///
    /// `observe` is evaluated on the configuration for every measurement and
    /// the measurement hook fires right after. Cancellation is polled after the
    /// relaxation and after every measurement.
    pub fn run<O>(
        &mut self,
        beta: f64,
        token: &CancellationToken,
        mut observe: impl FnMut(&C) -> O,
    ) -> (RunStatus, Vec<O>) {
        let mut observations = Vec::with_capacity(self.parameters.measurement_number as usize);
        self.do_steps(beta, self.parameters.relaxation_steps);
        if self.check_interrupt(token) {
            return (RunStatus::Stopped, observations);
        }
        for _ in 0..self.parameters.measurement_number {
            self.do_steps(beta, self.parameters.steps_between_measurement);
            observations.push(observe(self.walker.configuration()));
            self.measurements += 1;
            self.emit(HookEvent::Measurement);
            if self.check_interrupt(token) {
                return (RunStatus::Stopped, observations);
            }
        }
        debug!(
            beta,
            acceptance = self.walker.counters().acceptance_rate(),
            "metropolis run finished"
        );
        (RunStatus::Completed, observations)
    }

    /// Runs [`Self::run`] for every inverse temperature in turn, continuing
    /// from the configuration left by the previous one.
    pub fn run_ladder<O>(
        &mut self,
        betas: &[f64],
        token: &CancellationToken,
        mut observe: impl FnMut(&C) -> O,
    ) -> (RunStatus, Vec<Vec<O>>) {
        let mut series = Vec::with_capacity(betas.len());
        for beta in betas {
            let (status, observations) = self.run(*beta, token, &mut observe);
            series.push(observations);
            if status.is_stopped() {
                return (status, series);
            }
        }
        info!(temperatures = betas.len(), "metropolis ladder finished");
        (RunStatus::Completed, series)
    }
}

impl<C: Configuration, R> MetropolisSimulation<C, R> {
    /// Walker owning the configuration.
    pub fn walker(&self) -> &Walker<C, R> {
        &self.walker
    }

    /// Parameters of the run.
    pub fn parameters(&self) -> &MetropolisParameters {
        &self.parameters
    }

    /// Measurements taken so far.
    pub fn measurements(&self) -> u64 {
        self.measurements
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }

    /// Gives up ownership of the configuration.
    pub fn into_configuration(self) -> C {
        self.walker.into_configuration()
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

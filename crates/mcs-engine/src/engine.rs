use std::mem;

use mcs_core::errors::ErrorInfo;
use mcs_core::{Configuration, EnergyValue, McsError, RandomSource, Step};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How a [`Walker`] selects the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMode {
    /// Propose one step, accept or reject it.
    #[default]
    Standard,
    /// Enumerate every step and always execute one picked by weighted lottery.
    RejectionFree,
}

/// Bookkeeping shared between the engine and an [`AcceptanceRule`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepContext<E> {
    /// Running energy of the owned configuration.
    pub total_energy: E,
    /// Energy difference of the step under evaluation.
    pub delta_e: E,
}

impl<E: EnergyValue> StepContext<E> {
    /// Context for a configuration currently at `energy`.
    pub fn at(energy: E) -> Self {
        Self {
            total_energy: energy,
            delta_e: E::default(),
        }
    }

    /// Energy the configuration would have after the step under evaluation.
    pub fn energy_after(&self) -> E {
        self.total_energy + self.delta_e
    }
}

/// Algorithm plugged into the step engine.
///
/// The engine stores `step.delta_e()` in `context.delta_e` before asking for an
/// acceptance probability, and advances `context.total_energy` after a commit,
/// before `handle_executed` runs.
pub trait AcceptanceRule<S: Step> {
    /// Probability of accepting `step` (values above 1 are clamped by the engine).
    fn acceptance_probability(&mut self, step: &S, context: &mut StepContext<S::Energy>) -> f64;

    /// Called after a step was committed, with the residence `time` it stands for.
    fn handle_executed(&mut self, _time: f64, _context: &mut StepContext<S::Energy>) {}

    /// Called after a proposal was rejected, with the residence `time` it stands for.
    fn handle_rejected(&mut self, _time: f64, _context: &mut StepContext<S::Energy>) {}
}

/// Resolution of a single engine step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The step was committed to the configuration.
    Executed {
        /// Simulation time charged for the step.
        time: f64,
    },
    /// The configuration is unchanged.
    Rejected {
        /// Simulation time charged for the step.
        time: f64,
    },
}

impl StepOutcome {
    /// Simulation time charged for the step.
    pub fn time(&self) -> f64 {
        match self {
            StepOutcome::Executed { time } | StepOutcome::Rejected { time } => *time,
        }
    }

    /// Whether the step was committed.
    pub fn is_executed(&self) -> bool {
        matches!(self, StepOutcome::Executed { .. })
    }
}

/// Running totals of engine outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepCounters {
    /// Number of executed steps.
    pub executed: u64,
    /// Number of rejected steps.
    pub rejected: u64,
    /// Accumulated simulation time.
    pub time: f64,
}

impl StepCounters {
    /// Total number of resolved proposals.
    pub fn proposed(&self) -> u64 {
        self.executed + self.rejected
    }

    /// Fraction of proposals that were executed.
    pub fn acceptance_rate(&self) -> f64 {
        match self.proposed() {
            0 => 0.0,
            proposed => self.executed as f64 / proposed as f64,
        }
    }

    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Executed { .. } => self.executed += 1,
            StepOutcome::Rejected { .. } => self.rejected += 1,
        }
        self.time += outcome.time();
    }
}

/// Sole owner of a configuration together with its random stream and the
/// incrementally tracked energy.
#[derive(Debug)]
pub struct Walker<C: Configuration, R> {
    configuration: C,
    rng: R,
    context: StepContext<C::Energy>,
    counters: StepCounters,
    mode: SamplingMode,
}

impl<C: Configuration, R: RandomSource> Walker<C, R> {
    /// Takes ownership of `configuration`.
    ///
    /// Fails if rejection-free sampling is requested for a configuration that
    /// cannot enumerate its steps.
    pub fn new(configuration: C, rng: R, mode: SamplingMode) -> Result<Self, McsError> {
        if mode == SamplingMode::RejectionFree && configuration.all_steps().is_none() {
            return Err(McsError::Config(ErrorInfo::new(
                "rejection-free-unsupported",
                "configuration does not enumerate its steps",
            )));
        }
        let context = StepContext::at(configuration.energy());
        Ok(Self {
            configuration,
            rng,
            context,
            counters: StepCounters::default(),
            mode,
        })
    }

    /// Performs a single step in the walker's sampling mode.
    pub fn step<A: AcceptanceRule<C::Step>>(&mut self, rule: &mut A) -> StepOutcome {
        match self.mode {
            SamplingMode::Standard => self.standard_step(rule),
            SamplingMode::RejectionFree => self.rejection_free_step(rule, None),
        }
    }

    /// Performs a batch of steps.
    ///
    /// In standard mode this resolves `number` proposals. In rejection-free
    /// mode `number` is a simulation-time budget; the last step is executed
    /// with the probability that it falls inside the remaining budget.
    pub fn do_steps<A: AcceptanceRule<C::Step>>(&mut self, rule: &mut A, number: u64) {
        match self.mode {
            SamplingMode::Standard => {
                for _ in 0..number {
                    self.standard_step(rule);
                }
            }
            SamplingMode::RejectionFree => {
                let mut remaining = number as f64;
                while remaining > 0.0 {
                    let outcome = self.rejection_free_step(rule, Some(remaining));
                    remaining -= outcome.time();
                }
            }
        }
    }

    fn standard_step<A: AcceptanceRule<C::Step>>(&mut self, rule: &mut A) -> StepOutcome {
        let step = self.configuration.propose_step(&mut self.rng);
        if !step.is_executable() {
            return self.reject(rule, 1.0);
        }
        self.context.delta_e = step.delta_e();
        let probability = rule.acceptance_probability(&step, &mut self.context)
            / step.selection_probability_factor();
        if probability.is_nan() || probability <= 0.0 {
            return self.reject(rule, 1.0);
        }
        if probability >= 1.0 || self.rng.random_double() < probability {
            self.execute(rule, step, 1.0)
        } else {
            self.reject(rule, 1.0)
        }
    }

    fn rejection_free_step<A: AcceptanceRule<C::Step>>(
        &mut self,
        rule: &mut A,
        budget: Option<f64>,
    ) -> StepOutcome {
        let candidates = self.configuration.all_steps().unwrap_or_default();
        let mut cumulative = Vec::with_capacity(candidates.len());
        let mut total = 0.0;
        let mut last_positive = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let mut probability = 0.0;
            if candidate.is_executable() {
                self.context.delta_e = candidate.delta_e();
                let raw = rule.acceptance_probability(candidate, &mut self.context)
                    / candidate.selection_probability_factor();
                if raw > 0.0 {
                    probability = raw.min(1.0);
                    last_positive = Some(index);
                }
            }
            total += probability;
            cumulative.push(total);
        }

        let time = 1.0 / total;
        let Some(fallback) = last_positive.filter(|_| time.is_finite()) else {
            trace!(candidates = candidates.len(), "no step with positive weight");
            return self.reject(rule, 1.0);
        };

        let draw = self.rng.random_double() * total;
        let index = cumulative
            .iter()
            .position(|sum| *sum > draw)
            .unwrap_or(fallback);
        let Some(step) = candidates.into_iter().nth(index) else {
            return self.reject(rule, 1.0);
        };
        self.context.delta_e = step.delta_e();
        rule.acceptance_probability(&step, &mut self.context);

        match budget {
            Some(remaining) if time > remaining => {
                if self.rng.random_double() < remaining / time {
                    self.execute(rule, step, remaining)
                } else {
                    self.reject(rule, remaining)
                }
            }
            _ => self.execute(rule, step, time),
        }
    }

    fn execute<A: AcceptanceRule<C::Step>>(
        &mut self,
        rule: &mut A,
        step: C::Step,
        time: f64,
    ) -> StepOutcome {
        self.context.delta_e = step.delta_e();
        self.configuration.commit(step);
        self.context.total_energy = self.context.energy_after();
        rule.handle_executed(time, &mut self.context);
        let outcome = StepOutcome::Executed { time };
        self.counters.record(outcome);
        outcome
    }

    fn reject<A: AcceptanceRule<C::Step>>(&mut self, rule: &mut A, time: f64) -> StepOutcome {
        rule.handle_rejected(time, &mut self.context);
        let outcome = StepOutcome::Rejected { time };
        self.counters.record(outcome);
        outcome
    }
}

impl<C: Configuration, R> Walker<C, R> {
    /// Incrementally tracked energy of the owned configuration.
    pub fn energy(&self) -> C::Energy {
        self.context.total_energy
    }

    /// The owned configuration.
    pub fn configuration(&self) -> &C {
        &self.configuration
    }

    /// Engine context (tracked energy and the last evaluated difference).
    pub fn context(&self) -> &StepContext<C::Energy> {
        &self.context
    }

    /// Outcome totals since construction or the last reset.
    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    /// Clears the outcome totals.
    pub fn reset_counters(&mut self) {
        self.counters = StepCounters::default();
    }

    /// Restores previously captured outcome totals.
    pub fn set_counters(&mut self, counters: StepCounters) {
        self.counters = counters;
    }

    /// Sampling mode of the walker.
    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Random stream of the walker.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Recomputes the tracked energy from the configuration.
    pub fn resync_energy(&mut self) {
        self.context.total_energy = self.configuration.energy();
    }

    /// Installs a new configuration and hands back the previous one.
    pub fn replace_configuration(&mut self, configuration: C) -> C {
        let previous = mem::replace(&mut self.configuration, configuration);
        self.resync_energy();
        previous
    }

    /// Exchanges the configurations owned by two walkers.
    ///
    /// Tracked energies travel with their configurations; random streams,
    /// counters and modes stay with the walkers.
    pub fn swap_configurations(&mut self, other: &mut Self) {
        mem::swap(&mut self.configuration, &mut other.configuration);
        mem::swap(
            &mut self.context.total_energy,
            &mut other.context.total_energy,
        );
    }

    /// Gives up ownership of the configuration.
    pub fn into_configuration(self) -> C {
        self.configuration
    }

    /// Splits the walker into its configuration and random stream.
    pub fn into_parts(self) -> (C, R) {
        (self.configuration, self.rng)
    }
}

use std::collections::BTreeMap;
use std::mem;

use mcs_core::errors::ErrorInfo;
use mcs_core::{Configuration, EnergyValue, McsError, RandomSource};
use mcs_dos::{EnergyCutoffs, WangLandau, WangLandauState};
use mcs_engine::{CancellationToken, HookEvent, Hooks, RunStatus};
use mcs_hist::Histogram;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReplicaExchangeParameters;
use crate::exchange_log::ExchangeLog;
use crate::parallel::Executor;
use crate::tempering::replica_stream;

/// Serializable snapshot of a [`WangLandauReplicaExchange`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize, E: Serialize",
    deserialize = "C: Deserialize<'de>, E: EnergyValue"
))]
pub struct ReplicaExchangeState<C, E> {
    /// Shared parameters.
    pub parameters: ReplicaExchangeParameters<E>,
    /// Per-replica Wang-Landau snapshots, window-major.
    pub replicas: Vec<WangLandauState<C, E>>,
    /// Exchange outcomes.
    pub log: ExchangeLog,
    /// Completed modification factor stages.
    pub stages: u64,
}

/// Replica-exchange Wang-Landau over overlapping energy windows.
///
/// Replica `k` belongs to window `k / simulations_per_window` and never leaves
/// it; configurations travel between neighbouring windows through accepted
/// exchanges.
pub struct WangLandauReplicaExchange<C: Configuration, R> {
    replicas: Vec<WangLandau<C, R>>,
    parameters: ReplicaExchangeParameters<C::Energy>,
    executor: Executor,
    rng: R,
    log: ExchangeLog,
    stages: u64,
    hooks: Hooks<WangLandauReplicaExchange<C, R>>,
}

impl<C, R> WangLandauReplicaExchange<C, R>
where
    C: Configuration + Send,
    R: RandomSource + Clone + Send,
{
    /// Distributes `configurations` over the windows, window-major.
    ///
    /// Fails with [`McsError::InvalidRange`] unless there are exactly
    /// `windows * simulations_per_window` configurations and with
    /// [`McsError::EnergyOutOfRange`] when a configuration lies outside its
    /// window.
    pub fn new(
        parameters: ReplicaExchangeParameters<C::Energy>,
        configurations: Vec<C>,
        mut rng: R,
    ) -> Result<Self, McsError> {
        parameters.validate()?;
        let expected = parameters.energy_ranges.len() * parameters.simulations_per_window;
        if configurations.len() != expected {
            return Err(McsError::count_mismatch(
                "rewl-count",
                expected,
                configurations.len(),
            ));
        }
        let executor = Executor::new(&parameters.execution)?;
        let mut replicas = Vec::with_capacity(expected);
        for (index, configuration) in configurations.into_iter().enumerate() {
            let window = index / parameters.simulations_per_window;
            let (lower, upper) = parameters.energy_ranges[window];
            let energy = configuration.energy();
            if energy < lower || energy > upper {
                return Err(McsError::EnergyOutOfRange(
                    ErrorInfo::new(
                        "replica-outside-window",
                        "configuration energy lies outside its window",
                    )
                    .with_context("replica", index)
                    .with_context("window", window)
                    .with_context("energy", format!("{energy:?}"))
                    .with_context("range", format!("[{lower:?}, {upper:?}]")),
                ));
            }
            let mut wang_landau = parameters.wang_landau.clone();
            wang_landau.cutoffs = EnergyCutoffs::window(lower, upper);
            replicas.push(WangLandau::new(
                wang_landau,
                configuration,
                replica_stream(&mut rng),
            )?);
        }
        Ok(Self {
            replicas,
            parameters,
            executor,
            rng,
            log: ExchangeLog::default(),
            stages: 0,
            hooks: Hooks::new(),
        })
    }

    /// Rebuilds a run from a snapshot, deriving replica streams from `rng`.
    pub fn restore(
        state: ReplicaExchangeState<C, C::Energy>,
        mut rng: R,
    ) -> Result<Self, McsError> {
        state.parameters.validate()?;
        let expected = state.parameters.energy_ranges.len() * state.parameters.simulations_per_window;
        if state.replicas.len() != expected {
            return Err(McsError::count_mismatch(
                "rewl-count",
                expected,
                state.replicas.len(),
            ));
        }
        let executor = Executor::new(&state.parameters.execution)?;
        let replicas = state
            .replicas
            .into_iter()
            .map(|replica| WangLandau::restore(replica, replica_stream(&mut rng)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            replicas,
            parameters: state.parameters,
            executor,
            rng,
            log: state.log,
            stages: state.stages,
            hooks: Hooks::new(),
        })
    }

    /// Sweeps every replica until it is flat, at most
    /// `sweeps_per_replica_exchange` times.
    pub fn sweep_replicas(&mut self) {
        let sweeps = self.parameters.sweeps_per_replica_exchange;
        self.executor.for_each_mut(&mut self.replicas, |replica| {
            replica.run_sweeps(sweeps);
        });
    }

    /// Attempts one exchange between random members of two neighbouring windows.
    ///
    /// Returns whether the configurations were swapped. The attempt is
    /// rejected without an acceptance draw when either energy lies outside the
    /// other window. With a single window it is logged as a rejection at
    /// boundary 0.
    pub fn exchange(&mut self) -> bool {
        let windows = self.parameters.energy_ranges.len();
        if windows < 2 {
            self.log.record(0, false);
            self.emit(HookEvent::Exchange);
            return false;
        }
        let per_window = self.parameters.simulations_per_window;
        let boundary = self.rng.random_uint(0, (windows - 2) as u32) as usize;
        let first = boundary * per_window
            + self.rng.random_uint(0, (per_window - 1) as u32) as usize;
        let second = (boundary + 1) * per_window
            + self.rng.random_uint(0, (per_window - 1) as u32) as usize;

        let (lower, upper) = self.replicas.split_at_mut(second);
        let (left, right) = (&mut lower[first], &mut upper[0]);
        let energy_left = left.walker().energy();
        let energy_right = right.walker().energy();
        let (low_window, high_window) = (
            self.parameters.energy_ranges[boundary],
            self.parameters.energy_ranges[boundary + 1],
        );
        let admissible = contains(high_window, energy_left) && contains(low_window, energy_right);
        let accepted = admissible && {
            let left_dos = left.log_density_of_states();
            let right_dos = right.log_density_of_states();
            let exponent = left_dos.get(energy_left) - left_dos.get(energy_right)
                + right_dos.get(energy_right)
                - right_dos.get(energy_left);
            let probability = exponent.exp();
            probability >= 1.0 || self.rng.random_double() < probability
        };
        if accepted {
            left.swap_configurations(right);
        }
        self.log.record(boundary, accepted);
        debug!(boundary, admissible, accepted, "replica exchange");
        self.emit(HookEvent::Exchange);
        accepted
    }

    /// Anneals every replica down to the final modification factor.
    ///
    /// Each stage alternates replica sweeps and exchanges until all replicas
    /// are flat, then lowers the modification factor everywhere, resets the
    /// incidence counters, shifts the estimates and merges them per window.
    pub fn run(&mut self, token: &CancellationToken) -> RunStatus {
        info!(
            replicas = self.replicas.len(),
            windows = self.parameters.energy_ranges.len(),
            threads = self.executor.threads(),
            "replica exchange wang-landau started"
        );
        let target = self.parameters.wang_landau.modification_factor_final;
        while self.modification_factor() > target {
            loop {
                self.sweep_replicas();
                self.exchange();
                if self.check_interrupt(token) {
                    return RunStatus::Stopped;
                }
                if self.replicas.iter().all(|replica| replica.is_flat()) {
                    break;
                }
            }
            let next = self.modification_factor()
                * self.parameters.wang_landau.modification_factor_multiplier;
            for replica in &mut self.replicas {
                replica.reset_incidence_counter();
                replica.shift_log_density_of_states();
                replica.set_modification_factor(next);
            }
            self.merge_windows();
            self.stages += 1;
            info!(
                modification_factor = next,
                stage = self.stages,
                "replica modification factor lowered"
            );
            self.emit(HookEvent::ModificationFactor);
        }
        info!(
            stages = self.stages,
            exchanges = self.log.total_attempts(),
            "replica exchange wang-landau finished"
        );
        RunStatus::Completed
    }
}

fn contains<E: EnergyValue>((lower, upper): (E, E), energy: E) -> bool {
    energy >= lower && energy <= upper
}

impl<C: Configuration, R> WangLandauReplicaExchange<C, R> {
    /// Averages the estimates of the members of every window.
    ///
    /// Each member is shifted to zero at its lowest energy; a bin is averaged
    /// in linear space over the members holding it and every member receives
    /// the merged estimate.
    pub fn merge_windows(&mut self) {
        let per_window = self.parameters.simulations_per_window;
        if per_window < 2 {
            return;
        }
        for members in self.replicas.chunks_mut(per_window) {
            let mut bins: BTreeMap<C::Energy, Vec<f64>> = BTreeMap::new();
            for member in members.iter() {
                let estimate = member.log_density_of_states();
                let reference = estimate.min_key().map_or(0.0, |lowest| estimate.get(lowest));
                for (energy, log_g) in estimate.iter() {
                    bins.entry(energy).or_default().push(log_g - reference);
                }
            }
            let mut merged = Histogram::with_binning(
                members[0].log_density_of_states().binning().clone(),
            );
            for (energy, values) in bins {
                let largest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let sum: f64 = values.iter().map(|value| (value - largest).exp()).sum();
                merged.set(energy, largest + (sum / values.len() as f64).ln());
            }
            for member in members.iter_mut() {
                member.set_log_density_of_states(merged.clone());
            }
        }
    }

    /// Glues the window estimates into one log density of states.
    ///
    /// Each window is offset to agree with the already glued lower windows on
    /// the lowest energy they share; bins already covered keep the lower
    /// window's value. The result reads zero at the lowest energy.
    pub fn density_of_states(&self) -> Histogram<C::Energy, f64> {
        let per_window = self.parameters.simulations_per_window.max(1);
        let mut windows = self.replicas.chunks(per_window);
        let Some(first) = windows.next() else {
            return Histogram::new();
        };
        let mut glued = first[0].log_density_of_states().clone();
        for members in windows {
            let estimate = members[0].log_density_of_states();
            let offset = match estimate.keys().find(|energy| glued.contains(*energy)) {
                Some(shared) => glued.get(shared) - estimate.get(shared),
                None => {
                    warn!("neighbouring windows share no bin, gluing at the edges");
                    let below = glued.max_key().map_or(0.0, |key| glued.get(key));
                    let above = estimate.min_key().map_or(0.0, |key| estimate.get(key));
                    below - above
                }
            };
            for (energy, log_g) in estimate.iter() {
                if !glued.contains(energy) {
                    glued.set(energy, log_g + offset);
                }
            }
        }
        if let Some(lowest) = glued.min_key() {
            glued.shift_bin_zero(lowest);
        }
        glued
    }

    /// Modification factor shared by all replicas.
    pub fn modification_factor(&self) -> f64 {
        self.replicas
            .first()
            .map_or(0.0, |replica| replica.modification_factor())
    }

    /// Replicas, window-major.
    pub fn replicas(&self) -> &[WangLandau<C, R>] {
        &self.replicas
    }

    /// Energy windows.
    pub fn energy_ranges(&self) -> &[(C::Energy, C::Energy)] {
        &self.parameters.energy_ranges
    }

    /// Exchange outcomes so far.
    pub fn exchange_log(&self) -> &ExchangeLog {
        &self.log
    }

    /// Completed modification factor stages.
    pub fn stages(&self) -> u64 {
        self.stages
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }

    /// Gives up the configurations, window-major.
    pub fn into_configurations(self) -> Vec<C> {
        self.replicas
            .into_iter()
            .map(WangLandau::into_configuration)
            .collect()
    }

    /// Captures everything needed to resume the run.
    pub fn snapshot(&self) -> ReplicaExchangeState<C, C::Energy>
    where
        C: Clone,
    {
        ReplicaExchangeState {
            parameters: self.parameters.clone(),
            replicas: self.replicas.iter().map(WangLandau::snapshot).collect(),
            log: self.log.clone(),
            stages: self.stages,
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

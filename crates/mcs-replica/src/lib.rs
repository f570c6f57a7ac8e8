#![deny(missing_docs)]

//! Replica coordination for MCS samplers.
//!
//! [`Tempering`] runs Metropolis replicas on a ladder of inverse temperatures
//! and exchanges configurations between neighbouring slots; its ladder can
//! be respaced towards equal acceptance with [`Tempering::optimize_betas`].
//! [`WangLandauReplicaExchange`] splits the energy axis into overlapping
//! windows, runs Wang-Landau replicas inside them and glues the window
//! estimates into one density of states. Both schedule per-replica work
//! through an [`Executor`], serially or on a rayon pool.

/// Execution modes, ladders and coordinator parameters.
pub mod config;
/// Per-boundary exchange statistics.
pub mod exchange_log;
/// Equal-acceptance respacing of tempering ladders.
pub mod ladder_optimization;
/// Serial and pooled execution of replica batches.
pub mod parallel;
/// Parallel and serial tempering.
pub mod tempering;
/// Wang-Landau replica exchange over energy windows.
pub mod wl_exchange;

pub use config::{
    Execution, LadderConfig, LadderOptimizationParameters, LadderPolicy, LadderWeighting,
    ReplicaExchangeParameters, TemperingParameters,
};
pub use exchange_log::ExchangeLog;
pub use ladder_optimization::{equalize_acceptance, LadderOptimization};
pub use parallel::Executor;
pub use tempering::{exchange_acceptance, Tempering, TemperingState};
pub use wl_exchange::{ReplicaExchangeState, WangLandauReplicaExchange};

#![deny(missing_docs)]

//! Generic step engine for MCS samplers.
//!
//! A [`Walker`] owns one configuration and drives it through the
//! propose/accept/reject cycle of an [`AcceptanceRule`], either one proposal
//! at a time or by rejection-free lottery selection. Run loops built on top of
//! it poll a [`CancellationToken`] and report to registered [`Hooks`].

/// Checkpoint envelopes and JSON persistence.
pub mod checkpoint;
/// Cancellation token and observability hooks.
pub mod control;
/// YAML parameter loading and the Metropolis schedule.
pub mod config;
/// Walker, acceptance rule contract and step outcomes.
pub mod engine;
/// Fixed-temperature Metropolis sampling.
pub mod metropolis;

pub use checkpoint::{checkpoint_path, Checkpoint};
pub use config::{load_yaml, MetropolisParameters};
pub use control::{CancellationToken, Hook, HookEvent, Hooks, Interrupt, RunStatus};
pub use engine::{AcceptanceRule, SamplingMode, StepContext, StepCounters, StepOutcome, Walker};
pub use metropolis::{Metropolis, MetropolisSimulation};

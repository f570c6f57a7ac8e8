//! Respacing of a tempering ladder towards equal exchange acceptance.
//!
//! Every round measures the acceptance rate `a_i` of each boundary and moves
//! the inner inverse temperatures so that
//! `beta'_i - beta'_{i-1} = lambda * a_{i-1} * (beta_i - beta_{i-1})`,
//! with `lambda` chosen to keep both ends of the ladder in place. Boundaries
//! that exchange often are widened, rarely exchanging ones are narrowed.

use mcs_core::{Configuration, McsError, RandomSource};
use mcs_engine::{CancellationToken, RunStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{LadderOptimizationParameters, LadderWeighting};
use crate::tempering::Tempering;

/// One respacing round: spreads `betas` in proportion to the measured
/// boundary `acceptance`, keeping the first and last entry.
///
/// Returns `betas` unchanged when the ladder has no extent to distribute.
pub fn equalize_acceptance(betas: &[f64], acceptance: &[f64]) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (betas.first(), betas.last()) else {
        return Vec::new();
    };
    let spread: f64 = betas
        .windows(2)
        .zip(acceptance)
        .map(|(pair, rate)| rate * (pair[1] - pair[0]))
        .sum();
    if spread == 0.0 || !spread.is_finite() {
        return betas.to_vec();
    }
    let lambda = (last - first) / spread;
    let mut respaced = Vec::with_capacity(betas.len());
    respaced.push(first);
    let mut beta = first;
    for (pair, rate) in betas.windows(2).zip(acceptance) {
        beta += lambda * rate * (pair[1] - pair[0]);
        respaced.push(beta);
    }
    respaced
}

impl LadderWeighting {
    /// Normalised weights of the rounds whose boundary rates are `acceptance`.
    pub fn weights(self, acceptance: &[Vec<f64>]) -> Vec<f64> {
        let raw: Vec<f64> = match self {
            LadderWeighting::OnlyLast => {
                let mut weights = vec![0.0; acceptance.len()];
                if let Some(last) = weights.last_mut() {
                    *last = 1.0;
                }
                return weights;
            }
            LadderWeighting::WorstAcceptance => acceptance
                .iter()
                .map(|rates| rates.iter().copied().fold(f64::INFINITY, f64::min))
                .collect(),
            LadderWeighting::IndependentAcceptance => acceptance
                .iter()
                .map(|rates| {
                    let variance: f64 = rates.iter().map(|rate| rate.powi(-2)).sum();
                    variance.sqrt().recip()
                })
                .collect(),
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|weight| weight / total).collect()
    }
}

/// History of a ladder optimization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderOptimization {
    /// Ladders in the order they were used; `betas[r]` was measured as
    /// `acceptance[r]` and the final entry is the last respaced ladder.
    pub betas: Vec<Vec<f64>>,
    /// Boundary acceptance rates, one row per round.
    pub acceptance: Vec<Vec<f64>>,
}

impl LadderOptimization {
    /// Combination of the measured ladders under `weighting`.
    ///
    /// Before any round this is the starting ladder.
    pub fn weighted_betas(&self, weighting: LadderWeighting) -> Vec<f64> {
        if self.acceptance.is_empty() {
            return self.betas.last().cloned().unwrap_or_default();
        }
        let weights = weighting.weights(&self.acceptance);
        let slots = self.betas.first().map_or(0, Vec::len);
        let mut combined = vec![0.0; slots];
        for (ladder, weight) in self.betas.iter().zip(weights) {
            for (beta, value) in combined.iter_mut().zip(ladder) {
                *beta += weight * value;
            }
        }
        combined
    }
}

impl<C, R> Tempering<C, R>
where
    C: Configuration + Send,
    R: RandomSource + Clone + Send,
{
    /// Respaces the inverse temperatures towards equal acceptance on every
    /// boundary and installs the weighted result.
    ///
    /// Each round advances in batches of `steps_between_measurement` until
    /// every boundary has an accepted exchange, then respaces. Cancellation
    /// is polled after every batch; a stopped optimization keeps the ladder
    /// of its last completed round. The exchange log is cleared before and
    /// after every round. A single slot has nothing to respace.
    pub fn optimize_betas(
        &mut self,
        parameters: &LadderOptimizationParameters,
        token: &CancellationToken,
    ) -> Result<(RunStatus, LadderOptimization), McsError> {
        parameters.validate()?;
        let mut optimization = LadderOptimization {
            betas: vec![self.betas()],
            acceptance: Vec::new(),
        };
        let boundaries = self.len().saturating_sub(1);
        if boundaries == 0 {
            return Ok((RunStatus::Completed, optimization));
        }
        self.reset_exchange_log();
        for round in 0..parameters.optimization_steps {
            loop {
                self.advance(parameters.steps_between_measurement);
                if self.check_interrupt(token) {
                    self.reset_exchange_log();
                    return Ok((RunStatus::Stopped, optimization));
                }
                if (0..boundaries).all(|boundary| self.exchange_log().executed(boundary) > 0) {
                    break;
                }
            }
            let acceptance: Vec<f64> = (0..boundaries)
                .map(|boundary| self.exchange_log().acceptance_rate(boundary).unwrap_or(0.0))
                .collect();
            self.reset_exchange_log();
            let betas = equalize_acceptance(&self.betas(), &acceptance);
            self.set_betas(&betas)?;
            debug!(round, ?acceptance, ?betas, "ladder respaced");
            optimization.acceptance.push(acceptance);
            optimization.betas.push(betas);
        }
        let betas = optimization.weighted_betas(parameters.weighting);
        self.set_betas(&betas)?;
        info!(
            rounds = optimization.acceptance.len(),
            ?betas,
            "ladder optimization finished"
        );
        Ok((RunStatus::Completed, optimization))
    }
}

#![allow(dead_code)]

use mcs_core::{Configuration, RandomSource, Step};
use serde::{Deserialize, Serialize};

/// Periodic one-dimensional Ising chain with unit coupling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsingChain {
    pub id: u32,
    pub spins: Vec<i8>,
    pub enumerable: bool,
}

pub struct SpinFlip {
    pub site: usize,
    pub delta: i64,
    pub executable: bool,
}

impl Step for SpinFlip {
    type Energy = i64;

    fn delta_e(&self) -> i64 {
        self.delta
    }

    fn is_executable(&self) -> bool {
        self.executable
    }
}

impl IsingChain {
    pub fn ordered(id: u32, sites: usize) -> Self {
        Self {
            id,
            spins: vec![1; sites],
            enumerable: true,
        }
    }

    pub fn flip(&self, site: usize) -> SpinFlip {
        let sites = self.spins.len();
        let left = self.spins[(site + sites - 1) % sites];
        let right = self.spins[(site + 1) % sites];
        SpinFlip {
            site,
            delta: 2 * i64::from(self.spins[site]) * i64::from(left + right),
            executable: true,
        }
    }
}

impl Configuration for IsingChain {
    type Energy = i64;
    type Step = SpinFlip;

    fn energy(&self) -> i64 {
        let sites = self.spins.len();
        (0..sites)
            .map(|site| -i64::from(self.spins[site]) * i64::from(self.spins[(site + 1) % sites]))
            .sum()
    }

    fn propose_step<R: RandomSource + ?Sized>(&self, rng: &mut R) -> SpinFlip {
        self.flip(rng.random_index(self.spins.len()))
    }

    fn commit(&mut self, step: SpinFlip) {
        self.spins[step.site] = -self.spins[step.site];
    }

    fn all_steps(&self) -> Option<Vec<SpinFlip>> {
        if !self.enumerable {
            return None;
        }
        Some((0..self.spins.len()).map(|site| self.flip(site)).collect())
    }
}

/// Exact log density of states of a periodic chain, relative to the ground state.
pub fn exact_log_dos(sites: usize) -> Vec<(i64, f64)> {
    let mut binomial = vec![1.0f64; sites + 1];
    for k in 1..=sites {
        binomial[k] = binomial[k - 1] * (sites + 1 - k) as f64 / k as f64;
    }
    (0..=sites)
        .step_by(2)
        .map(|walls| (-(sites as i64) + 2 * walls as i64, (binomial[walls]).ln()))
        .collect()
}

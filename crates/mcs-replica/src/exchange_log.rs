use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Exchange outcomes keyed by boundary index (`i` is the pair `i, i + 1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeLog {
    /// Accepted exchanges per boundary.
    pub executed: BTreeMap<usize, u64>,
    /// Rejected exchanges per boundary.
    pub rejected: BTreeMap<usize, u64>,
}

impl ExchangeLog {
    /// Records one attempt at `boundary`.
    pub fn record(&mut self, boundary: usize, accepted: bool) {
        let counts = if accepted {
            &mut self.executed
        } else {
            &mut self.rejected
        };
        *counts.entry(boundary).or_insert(0) += 1;
    }

    /// Accepted exchanges at `boundary`.
    pub fn executed(&self, boundary: usize) -> u64 {
        self.executed.get(&boundary).copied().unwrap_or(0)
    }

    /// Rejected exchanges at `boundary`.
    pub fn rejected(&self, boundary: usize) -> u64 {
        self.rejected.get(&boundary).copied().unwrap_or(0)
    }

    /// Attempts at `boundary`.
    pub fn attempts(&self, boundary: usize) -> u64 {
        self.executed(boundary) + self.rejected(boundary)
    }

    /// Attempts over all boundaries.
    pub fn total_attempts(&self) -> u64 {
        self.executed.values().chain(self.rejected.values()).sum()
    }

    /// Fraction of accepted attempts at `boundary`, `None` before any attempt.
    pub fn acceptance_rate(&self, boundary: usize) -> Option<f64> {
        match self.attempts(boundary) {
            0 => None,
            attempts => Some(self.executed(boundary) as f64 / attempts as f64),
        }
    }
}

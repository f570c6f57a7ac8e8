use mcs_core::EnergyValue;
use mcs_hist::Histogram;
use serde::{Deserialize, Serialize};

/// Canonical expectation values at one inverse temperature.
///
/// Quantities derived from the partition function are relative to the
/// normalisation of the log density of states they were computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAverages {
    /// Inverse temperature.
    pub beta: f64,
    /// `ln Z`.
    pub log_partition_function: f64,
    /// `<E>`.
    pub mean_energy: f64,
    /// `beta^2 (<E^2> - <E>^2)`.
    pub specific_heat: f64,
    /// `-ln Z / beta`.
    pub free_energy: f64,
    /// `ln Z + beta <E>`.
    pub entropy: f64,
}

/// `ln Z(beta) = ln sum_E g(E) exp(-beta E)`, or `None` for an empty histogram.
pub fn log_partition_function<E: EnergyValue>(
    log_density_of_states: &Histogram<E, f64>,
    beta: f64,
) -> Option<f64> {
    let exponents: Vec<f64> = log_density_of_states
        .iter()
        .map(|(energy, log_g)| log_g - beta * energy.to_f64())
        .collect();
    let largest = exponents.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !largest.is_finite() {
        return None;
    }
    let sum: f64 = exponents.iter().map(|x| (x - largest).exp()).sum();
    Some(largest + sum.ln())
}

/// Canonical averages implied by `log_density_of_states` at `beta`.
pub fn canonical_averages<E: EnergyValue>(
    log_density_of_states: &Histogram<E, f64>,
    beta: f64,
) -> Option<CanonicalAverages> {
    let log_z = log_partition_function(log_density_of_states, beta)?;
    let (mut first, mut second) = (0.0, 0.0);
    for (energy, log_g) in log_density_of_states.iter() {
        let energy = energy.to_f64();
        let probability = (log_g - beta * energy - log_z).exp();
        first += probability * energy;
        second += probability * energy * energy;
    }
    Some(CanonicalAverages {
        beta,
        log_partition_function: log_z,
        mean_energy: first,
        specific_heat: beta * beta * (second - first * first),
        free_energy: -log_z / beta,
        entropy: log_z + beta * first,
    })
}

mod common;

use common::{exact_log_dos, IsingChain};
use mcs_core::{Configuration, RngHandle};
use mcs_engine::{CancellationToken, MetropolisParameters, MetropolisSimulation, RunStatus};

fn exact_mean_energy(sites: usize, beta: f64) -> f64 {
    let levels = exact_log_dos(sites);
    let weights: Vec<(f64, f64)> = levels
        .iter()
        .map(|(energy, log_g)| (*energy as f64, (log_g - beta * *energy as f64).exp()))
        .collect();
    let partition: f64 = weights.iter().map(|(_, weight)| weight).sum();
    weights.iter().map(|(energy, weight)| energy * weight).sum::<f64>() / partition
}

fn sample_parameters() -> MetropolisParameters {
    MetropolisParameters {
        relaxation_steps: 500,
        measurement_number: 3_000,
        steps_between_measurement: 40,
        ..MetropolisParameters::default()
    }
}

#[test]
fn mean_energy_matches_exact_chain_average() {
    let beta = 0.5;
    let mut simulation = MetropolisSimulation::new(
        IsingChain::ordered(0, 8),
        RngHandle::from_seed(2024),
        sample_parameters(),
    )
    .unwrap();
    let (status, energies) =
        simulation.run(beta, &CancellationToken::new(), |chain| chain.energy() as f64);
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(energies.len(), 3_000);
    let mean = energies.iter().sum::<f64>() / energies.len() as f64;
    let exact = exact_mean_energy(8, beta);
    assert!((mean - exact).abs() < 0.5, "mean {mean} vs exact {exact}");
}

#[test]
fn ladder_runs_each_temperature_in_turn() {
    let parameters = MetropolisParameters {
        relaxation_steps: 100,
        measurement_number: 20,
        steps_between_measurement: 10,
        ..MetropolisParameters::default()
    };
    let mut simulation =
        MetropolisSimulation::new(IsingChain::ordered(0, 8), RngHandle::from_seed(5), parameters)
            .unwrap();
    let (status, series) =
        simulation.run_ladder(&[0.1, 0.5, 2.0], &CancellationToken::new(), |chain| chain.energy());
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(series.len(), 3);
    assert!(series.iter().all(|values| values.len() == 20));
    assert_eq!(simulation.measurements(), 60);
}

#[test]
fn zero_measurement_spacing_is_rejected() {
    let parameters = MetropolisParameters {
        steps_between_measurement: 0,
        ..MetropolisParameters::default()
    };
    assert!(
        MetropolisSimulation::new(IsingChain::ordered(0, 4), RngHandle::from_seed(0), parameters)
            .is_err()
    );
}

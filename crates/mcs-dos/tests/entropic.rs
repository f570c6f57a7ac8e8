mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{exact_log_dos, IsingChain};
use mcs_core::RngHandle;
use mcs_dos::{
    EnergyCutoffs, EntropicParameters, EntropicSampling, StepSchedule, WangLandau,
    WangLandauParameters,
};
use mcs_engine::{CancellationToken, HookEvent, RunStatus};
use mcs_hist::Histogram;

fn flat_start(energies: &[i64]) -> Histogram<i64, f64> {
    energies.iter().map(|energy| (*energy, 0.0)).collect()
}

#[test]
fn schedules_produce_the_documented_step_counts() {
    let constant = StepSchedule::Constant { steps: 500 };
    assert_eq!(constant.steps_for(0), 500);
    assert_eq!(constant.steps_for(9), 500);

    let linear = StepSchedule::Linear {
        initial: 100,
        growth: 50,
    };
    assert_eq!(linear.steps_for(0), 100);
    assert_eq!(linear.steps_for(4), 300);

    let power = StepSchedule::PowerLaw {
        initial: 10,
        base: 2.0,
    };
    assert_eq!(power.steps_for(0), 10);
    assert_eq!(power.steps_for(3), 80);
}

#[test]
fn flat_start_converges_to_the_exact_density_of_states() {
    let parameters = EntropicParameters {
        flatness: 0.85,
        sweep_steps: 50_000,
        ..EntropicParameters::default()
    };
    let mut sampling = EntropicSampling::new(
        parameters,
        flat_start(&[-8, -4, 0, 4, 8]),
        IsingChain::ordered(0, 8),
        RngHandle::from_seed(17),
    )
    .unwrap();

    assert_eq!(sampling.run(&CancellationToken::new()), RunStatus::Completed);
    assert!(sampling.last_flatness() >= 0.85);
    assert_eq!(sampling.log_density_of_states().get(-8), 0.0);
    for (energy, expected) in exact_log_dos(8) {
        let got = sampling.log_density_of_states().get(energy);
        assert!(
            (got - expected).abs() < 0.3,
            "ln g({energy}) = {got}, expected {expected}"
        );
    }
}

#[test]
fn fixed_iterations_continue_a_wang_landau_estimate() {
    let wang_landau_parameters = WangLandauParameters {
        modification_factor_final: 1e-2,
        modification_factor_multiplier: 0.5,
        ..WangLandauParameters::default()
    };
    let mut wang_landau = WangLandau::new(
        wang_landau_parameters,
        IsingChain::ordered(0, 8),
        RngHandle::from_seed(19),
    )
    .unwrap();
    assert_eq!(wang_landau.run(&CancellationToken::new()), RunStatus::Completed);

    let mut sampling =
        EntropicSampling::from_wang_landau(EntropicParameters::default(), wang_landau).unwrap();
    let sweeps = Arc::new(AtomicUsize::new(0));
    let seen = sweeps.clone();
    sampling.hooks_mut().register(HookEvent::Sweep, move |es| {
        assert!(es.incidence_counter().sum() > 0.0, "hook sees the finished sweep");
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let carried = sampling.walker().counters().proposed();
    let schedule = StepSchedule::PowerLaw {
        initial: 2_000,
        base: 2.0,
    };
    let status = sampling.run_iterations(4, &schedule, &CancellationToken::new());
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(sampling.sweeps(), 4);
    assert_eq!(sweeps.load(Ordering::SeqCst), 4);
    assert_eq!(sampling.incidence_counter().sum(), 0.0);
    assert_eq!(
        sampling.walker().counters().proposed() - carried,
        2_000 + 4_000 + 8_000 + 16_000
    );
}

#[test]
fn cutoffs_confine_the_refined_estimate() {
    let parameters = EntropicParameters {
        sweep_steps: 5_000,
        cutoffs: EnergyCutoffs {
            lower: None,
            upper: Some(0),
        },
        ..EntropicParameters::default()
    };
    let mut sampling = EntropicSampling::new(
        parameters,
        flat_start(&[-8, -4, 0]),
        IsingChain::ordered(0, 8),
        RngHandle::from_seed(23),
    )
    .unwrap();
    let schedule = StepSchedule::Constant { steps: 5_000 };
    sampling.run_iterations(3, &schedule, &CancellationToken::new());

    assert_eq!(sampling.log_density_of_states().max_key(), Some(0));
    assert_eq!(sampling.walker().energy().max(0), 0);
}

#[test]
fn stop_request_still_resets_the_counter() {
    let token = CancellationToken::new();
    token.request_stop();
    let mut sampling = EntropicSampling::new(
        EntropicParameters::default(),
        flat_start(&[-8, -4, 0, 4, 8]),
        IsingChain::ordered(0, 8),
        RngHandle::from_seed(29),
    )
    .unwrap();

    assert_eq!(sampling.sweep(1_000, &token), RunStatus::Stopped);
    assert_eq!(sampling.sweeps(), 1);
    assert_eq!(sampling.incidence_counter().sum(), 0.0);
    assert_eq!(sampling.run(&token), RunStatus::Stopped);
}

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::IsingChain;
use mcs_core::{Configuration, McsError, RngHandle, RunProvenance};
use mcs_engine::{checkpoint_path, CancellationToken, Checkpoint, HookEvent, RunStatus};
use mcs_replica::{
    exchange_acceptance, Execution, LadderConfig, LadderPolicy, Tempering, TemperingParameters,
    TemperingState,
};

fn chains(count: u32, sites: usize) -> Vec<IsingChain> {
    (0..count).map(|id| IsingChain::ordered(id, sites)).collect()
}

fn ids(tempering: Tempering<IsingChain, RngHandle>) -> Vec<u32> {
    tempering
        .into_configurations()
        .into_iter()
        .map(|chain| chain.id)
        .collect()
}

#[test]
fn acceptance_favours_moving_low_energies_to_cold_slots() {
    assert_eq!(exchange_acceptance(2.0, -8.0, 1.0, -2.0), (-6.0f64).exp());
    assert_eq!(exchange_acceptance(2.0, -2.0, 1.0, -8.0), 1.0);
    assert_eq!(exchange_acceptance(1.0, 3.0, 1.0, -3.0), 1.0);
}

#[test]
fn single_replica_logs_a_rejection() {
    let mut tempering = Tempering::new(
        TemperingParameters::default(),
        vec![1.0],
        chains(1, 8),
        RngHandle::from_seed(1),
    )
    .unwrap();
    assert!(!tempering.exchange());
    assert_eq!(tempering.exchange_log().rejected(0), 1);
    assert_eq!(tempering.exchange_log().executed(0), 0);
    assert_eq!(tempering.exchange_log().acceptance_rate(0), Some(0.0));
}

#[test]
fn empty_or_mismatched_inputs_are_rejected() {
    let empty = Tempering::<IsingChain, _>::new(
        TemperingParameters::default(),
        Vec::new(),
        Vec::new(),
        RngHandle::from_seed(2),
    );
    assert!(matches!(empty, Err(McsError::InvalidRange(info)) if info.code == "tempering-empty"));

    let mismatched = Tempering::new(
        TemperingParameters::default(),
        vec![1.0, 0.5, 0.25],
        chains(2, 8),
        RngHandle::from_seed(2),
    );
    match mismatched {
        Err(McsError::InvalidRange(info)) => {
            assert_eq!(info.code, "tempering-count");
            assert_eq!(info.context.get("expected").map(String::as_str), Some("3"));
        }
        other => panic!("expected InvalidRange, got {:?}", other.err()),
    }

    let no_interval = TemperingParameters {
        steps_between_replica_exchange: 0,
        ..TemperingParameters::default()
    };
    assert!(matches!(
        Tempering::new(no_interval, vec![1.0], chains(1, 8), RngHandle::from_seed(2)),
        Err(McsError::Config(_))
    ));
}

#[test]
fn equal_temperatures_always_swap() {
    let mut tempering = Tempering::new(
        TemperingParameters::default(),
        vec![0.7, 0.7],
        chains(2, 8),
        RngHandle::from_seed(3),
    )
    .unwrap();
    assert!(tempering.exchange());
    assert!(tempering.exchange());
    assert!(tempering.exchange());
    assert_eq!(tempering.exchange_log().executed(0), 3);
    assert_eq!(ids(tempering), vec![1, 0]);
}

#[test]
fn configurations_are_permuted_not_lost() {
    let parameters = TemperingParameters {
        steps_between_replica_exchange: 5,
        ..TemperingParameters::default()
    };
    let mut tempering = Tempering::new(
        parameters,
        vec![2.0, 1.0, 0.5, 0.1],
        chains(4, 12),
        RngHandle::from_seed(4),
    )
    .unwrap();
    tempering.advance(2_000);
    for slot in 0..tempering.len() {
        let walker = tempering.walker(slot).unwrap();
        assert_eq!(walker.energy(), walker.configuration().energy());
    }
    assert_eq!(tempering.exchange_log().total_attempts(), 400);
    assert_eq!(tempering.betas(), vec![2.0, 1.0, 0.5, 0.1]);

    let mut seen = ids(tempering);
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn pooled_execution_matches_serial_execution() {
    let run = |execution: Execution| {
        let parameters = TemperingParameters {
            execution,
            ..TemperingParameters::default()
        };
        let mut tempering = Tempering::new(
            parameters,
            vec![1.5, 1.0, 0.6, 0.3],
            chains(4, 16),
            RngHandle::from_seed(5),
        )
        .unwrap();
        tempering.advance(1_000);
        let log = tempering.exchange_log().clone();
        (tempering.energies(), log, ids(tempering))
    };
    let serial = run(Execution::Serial);
    let pooled = run(Execution::Parallel { threads: 3 });
    assert_eq!(serial, pooled);
}

#[test]
fn ladder_builds_inverse_temperatures() {
    let ladder = LadderConfig {
        replicas: 3,
        base_temperature: 1.0,
        policy: LadderPolicy::Geometric { ratio: 2.0 },
    };
    let tempering = Tempering::with_ladder(
        TemperingParameters::default(),
        &ladder,
        chains(3, 8),
        RngHandle::from_seed(6),
    )
    .unwrap();
    assert_eq!(tempering.betas(), vec![1.0, 0.5, 0.25]);

    let manual = LadderConfig {
        policy: LadderPolicy::Manual {
            temperatures: vec![0.5, 4.0],
        },
        ..LadderConfig::default()
    };
    assert_eq!(manual.inverse_temperatures(), vec![2.0, 0.25]);
}

#[test]
fn non_positive_temperatures_are_rejected() {
    for temperature in [0.0, -1.0, f64::NAN] {
        let ladder = LadderConfig {
            policy: LadderPolicy::Manual {
                temperatures: vec![temperature, 2.0],
            },
            ..LadderConfig::default()
        };
        let result = Tempering::with_ladder(
            TemperingParameters::default(),
            &ladder,
            chains(2, 8),
            RngHandle::from_seed(6),
        );
        match result {
            Err(McsError::Config(info)) => assert_eq!(info.code, "ladder-temperature"),
            other => panic!("temperature {temperature} gave {:?}", other.err()),
        }
    }

    let frozen = LadderConfig {
        base_temperature: 0.0,
        ..LadderConfig::default()
    };
    assert!(frozen.validate().is_err());

    let infinite = Tempering::new(
        TemperingParameters::default(),
        vec![f64::INFINITY, 1.0],
        chains(2, 8),
        RngHandle::from_seed(6),
    );
    assert!(matches!(infinite, Err(McsError::Config(info)) if info.code == "tempering-beta"));
}

#[test]
fn run_measures_every_slot_and_cold_slots_are_lower() {
    let parameters = TemperingParameters {
        relaxation_steps: 500,
        measurement_number: 400,
        steps_between_measurement: 20,
        steps_between_replica_exchange: 10,
        ..TemperingParameters::default()
    };
    let mut tempering = Tempering::new(
        parameters,
        vec![2.0, 0.8, 0.1],
        chains(3, 8),
        RngHandle::from_seed(7),
    )
    .unwrap();
    let measured = Arc::new(AtomicUsize::new(0));
    let seen = measured.clone();
    tempering
        .hooks_mut()
        .register(HookEvent::Measurement, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let (status, rows) =
        tempering.run(&CancellationToken::new(), |_, chain| chain.energy() as f64);
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(rows.len(), 400);
    assert!(rows.iter().all(|row| row.len() == 3));
    assert_eq!(measured.load(Ordering::SeqCst), 400);
    assert_eq!(tempering.measurements(), 400);

    let mean = |slot: usize| rows.iter().map(|row| row[slot]).sum::<f64>() / rows.len() as f64;
    assert!(mean(0) < mean(1));
    assert!(mean(1) < mean(2));
    assert!(mean(0) < -7.0, "cold slot stays near the ground state");
}

#[test]
fn stop_request_ends_the_run_after_the_current_measurement() {
    let token = CancellationToken::new();
    let parameters = TemperingParameters {
        relaxation_steps: 10,
        measurement_number: 50,
        steps_between_measurement: 10,
        ..TemperingParameters::default()
    };
    let mut tempering =
        Tempering::new(parameters, vec![1.0, 0.5], chains(2, 8), RngHandle::from_seed(8))
            .unwrap();
    let remote = token.clone();
    tempering
        .hooks_mut()
        .register(HookEvent::Measurement, move |run| {
            if run.measurements() == 4 {
                remote.request_stop();
            }
        });
    let (status, rows) = tempering.run(&token, |slot, _| slot);
    assert_eq!(status, RunStatus::Stopped);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], vec![0, 1]);
}

#[test]
fn snapshot_restores_slots_and_statistics() {
    let mut tempering = Tempering::new(
        TemperingParameters::default(),
        vec![1.0, 0.5, 0.25],
        chains(3, 8),
        RngHandle::from_seed(9),
    )
    .unwrap();
    tempering.advance(300);

    let dir = tempfile::tempdir().unwrap();
    let path = checkpoint_path(dir.path(), tempering.exchange_log().total_attempts());
    Checkpoint::new(
        RunProvenance::new("tempering", 9),
        tempering.exchange_log().total_attempts(),
        tempering.snapshot(),
    )
    .store(&path)
    .unwrap();
    let loaded = Checkpoint::<TemperingState<IsingChain>>::load(&path).unwrap();
    assert_eq!(loaded.sweep, 30);
    let restored = Tempering::restore(loaded.state, RngHandle::from_seed(10)).unwrap();

    assert_eq!(restored.betas(), tempering.betas());
    assert_eq!(restored.energies(), tempering.energies());
    assert_eq!(restored.exchange_log(), tempering.exchange_log());
    for slot in 0..3 {
        assert_eq!(
            restored.walker(slot).unwrap().counters(),
            tempering.walker(slot).unwrap().counters()
        );
    }
}

mod common;

use common::{exact_log_dos, IsingChain};
use mcs_core::{Configuration, McsError, RngHandle};
use mcs_dos::WangLandauParameters;
use mcs_engine::{CancellationToken, HookEvent, RunStatus};
use mcs_replica::{
    Execution, ReplicaExchangeParameters, ReplicaExchangeState, WangLandauReplicaExchange,
};

fn two_windows(per_window: usize) -> ReplicaExchangeParameters<i64> {
    ReplicaExchangeParameters {
        simulations_per_window: per_window,
        wang_landau: WangLandauParameters {
            flatness: 0.8,
            modification_factor_final: 1e-4,
            modification_factor_multiplier: 0.5,
            sweep_steps: 500,
            ..WangLandauParameters::default()
        },
        ..ReplicaExchangeParameters::with_ranges(vec![(-8, 0), (-4, 8)])
    }
}

fn window_chains(per_window: u32) -> Vec<IsingChain> {
    let low = (0..per_window).map(|id| IsingChain::ordered(id, 8));
    let high = (per_window..2 * per_window).map(|id| IsingChain::domain_wall(id, 8));
    low.chain(high).collect()
}

#[test]
fn replica_count_must_match_the_windows() {
    let result = WangLandauReplicaExchange::new(
        two_windows(2),
        window_chains(1),
        RngHandle::from_seed(1),
    );
    match result {
        Err(McsError::InvalidRange(info)) => {
            assert_eq!(info.code, "rewl-count");
            assert_eq!(info.context.get("expected").map(String::as_str), Some("4"));
            assert_eq!(info.context.get("actual").map(String::as_str), Some("2"));
        }
        other => panic!("expected InvalidRange, got {:?}", other.err()),
    }

    let no_windows = ReplicaExchangeParameters::<i64>::with_ranges(Vec::new());
    assert!(matches!(
        WangLandauReplicaExchange::<IsingChain, _>::new(
            no_windows,
            Vec::new(),
            RngHandle::from_seed(1)
        ),
        Err(McsError::InvalidRange(_))
    ));
}

#[test]
fn configuration_outside_its_window_is_rejected() {
    let chains = vec![IsingChain::ordered(0, 8), IsingChain::ordered(1, 8)];
    let result = WangLandauReplicaExchange::new(two_windows(1), chains, RngHandle::from_seed(2));
    match result {
        Err(McsError::EnergyOutOfRange(info)) => {
            assert_eq!(info.code, "replica-outside-window");
            assert_eq!(info.context.get("replica").map(String::as_str), Some("1"));
        }
        other => panic!("expected EnergyOutOfRange, got {:?}", other.err()),
    }
}

#[test]
fn inverted_window_is_a_config_error() {
    let parameters = ReplicaExchangeParameters::with_ranges(vec![(0i64, -8)]);
    assert!(matches!(parameters.validate(), Err(McsError::Config(info)) if info.code == "rewl-window"));
}

#[test]
fn single_window_exchange_is_logged_as_rejected() {
    let parameters = ReplicaExchangeParameters::with_ranges(vec![(-8i64, 8)]);
    let mut exchange = WangLandauReplicaExchange::new(
        parameters,
        vec![IsingChain::ordered(0, 8)],
        RngHandle::from_seed(3),
    )
    .unwrap();
    assert!(!exchange.exchange());
    assert_eq!(exchange.exchange_log().rejected(0), 1);
}

#[test]
fn exchange_requires_both_energies_inside_the_other_window() {
    let mut exchange =
        WangLandauReplicaExchange::new(two_windows(1), window_chains(1), RngHandle::from_seed(4))
            .unwrap();
    assert!(!exchange.exchange(), "-8 lies outside [-4, 8]");
    assert_eq!(exchange.exchange_log().rejected(0), 1);

    let chains = vec![IsingChain::domain_wall(0, 8), IsingChain::domain_wall(1, 8)];
    let mut exchange =
        WangLandauReplicaExchange::new(two_windows(1), chains, RngHandle::from_seed(4)).unwrap();
    assert!(exchange.exchange(), "empty estimates accept every admissible swap");
    assert_eq!(exchange.exchange_log().executed(0), 1);
    let ids: Vec<u32> = exchange
        .into_configurations()
        .into_iter()
        .map(|chain| chain.id)
        .collect();
    assert_eq!(ids, vec![1, 0]);
}

#[test]
fn glued_windows_reproduce_the_exact_density_of_states() {
    let mut exchange =
        WangLandauReplicaExchange::new(two_windows(1), window_chains(1), RngHandle::from_seed(5))
            .unwrap();
    assert_eq!(exchange.run(&CancellationToken::new()), RunStatus::Completed);
    assert!(exchange.modification_factor() <= 1e-4);
    assert!(exchange.exchange_log().total_attempts() > 0);
    for replica in exchange.replicas() {
        let energy = replica.walker().energy();
        assert_eq!(energy, replica.walker().configuration().energy());
    }

    let glued = exchange.density_of_states();
    let exact = exact_log_dos(8);
    assert_eq!(glued.len(), exact.len());
    assert_eq!(glued.get(-8), 0.0);
    for (energy, expected) in exact {
        let got = glued.get(energy);
        assert!(
            (got - expected).abs() < 0.3,
            "ln g({energy}) = {got}, expected {expected}"
        );
    }
}

#[test]
fn members_of_a_window_share_the_merged_estimate() {
    let parameters = ReplicaExchangeParameters {
        execution: Execution::Parallel { threads: 2 },
        ..two_windows(2)
    };
    let mut exchange =
        WangLandauReplicaExchange::new(parameters, window_chains(2), RngHandle::from_seed(6))
            .unwrap();
    assert_eq!(exchange.run(&CancellationToken::new()), RunStatus::Completed);
    assert_eq!(exchange.stages(), 14, "0.5^14 is the first factor below 1e-4");

    let replicas = exchange.replicas();
    assert_eq!(
        replicas[0].log_density_of_states(),
        replicas[1].log_density_of_states()
    );
    assert_eq!(
        replicas[2].log_density_of_states(),
        replicas[3].log_density_of_states()
    );
    let lowest = replicas[0].log_density_of_states();
    assert_eq!(lowest.keys().collect::<Vec<_>>(), vec![-8, -4, 0]);
    assert!((lowest.get(-4) - lowest.get(-8) - 28f64.ln()).abs() < 0.3);
}

#[test]
fn stages_finish_when_the_counters_are_reset_every_sweep() {
    let mut parameters = two_windows(1);
    parameters.wang_landau.reset_sweep_number = 1;
    parameters.wang_landau.flatness = 0.5;
    parameters.wang_landau.modification_factor_final = 1e-2;
    let mut exchange =
        WangLandauReplicaExchange::new(parameters, window_chains(1), RngHandle::from_seed(11))
            .unwrap();
    assert_eq!(exchange.run(&CancellationToken::new()), RunStatus::Completed);
    assert_eq!(exchange.stages(), 7, "0.5^7 is the first factor below 1e-2");
}

#[test]
fn pooled_execution_matches_serial_execution() {
    let run = |execution: Execution| {
        let parameters = ReplicaExchangeParameters {
            execution,
            ..two_windows(2)
        };
        let mut exchange =
            WangLandauReplicaExchange::new(parameters, window_chains(2), RngHandle::from_seed(7))
                .unwrap();
        for _ in 0..5 {
            exchange.sweep_replicas();
            exchange.exchange();
        }
        exchange
            .replicas()
            .iter()
            .map(|replica| replica.log_density_of_states().clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(Execution::Serial), run(Execution::Parallel { threads: 4 }));
}

#[test]
fn stop_request_interrupts_between_exchanges() {
    let token = CancellationToken::new();
    let mut exchange =
        WangLandauReplicaExchange::new(two_windows(1), window_chains(1), RngHandle::from_seed(8))
            .unwrap();
    let remote = token.clone();
    exchange
        .hooks_mut()
        .register(HookEvent::Exchange, move |run| {
            if run.exchange_log().total_attempts() == 3 {
                remote.request_stop();
            }
        });
    assert_eq!(exchange.run(&token), RunStatus::Stopped);
    assert_eq!(exchange.exchange_log().total_attempts(), 3);
}

#[test]
fn snapshot_resumes_the_run() {
    let mut exchange =
        WangLandauReplicaExchange::new(two_windows(1), window_chains(1), RngHandle::from_seed(9))
            .unwrap();
    exchange.sweep_replicas();
    exchange.exchange();

    let json = serde_json::to_string(&exchange.snapshot()).unwrap();
    let state: ReplicaExchangeState<IsingChain, i64> = serde_json::from_str(&json).unwrap();
    let mut restored = WangLandauReplicaExchange::restore(state, RngHandle::from_seed(10)).unwrap();

    assert_eq!(restored.exchange_log(), exchange.exchange_log());
    for (left, right) in restored.replicas().iter().zip(exchange.replicas()) {
        assert_eq!(left.log_density_of_states(), right.log_density_of_states());
        assert_eq!(left.walker().configuration(), right.walker().configuration());
    }
    assert_eq!(restored.run(&CancellationToken::new()), RunStatus::Completed);
}

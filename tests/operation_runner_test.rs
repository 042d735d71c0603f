mod common;

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

use common::{
    open_request, utxo, FakeBroadcaster, FakeBuilder, FakeProver, FakeSigner, Harness, START_MS,
    TTL_MS,
};
use zkusd_operations::application::{RunnerSetupError, VaultOperationRunner};
use zkusd_operations::config::AppConfig;
use zkusd_operations::domain::errors::ErrorType;
use zkusd_operations::domain::models::{Availability, TransactionPair, VaultState};
use zkusd_operations::domain::services::operation_machine::{
    create_initial_context, reset, OperationContext,
};
use zkusd_operations::infrastructure::prover::{ProveRequest, ProverClientError, SpellProver};
use zkusd_operations::infrastructure::storage::{JsonFileStore, KeyValueStore};
use zkusd_operations::utils::clock::ManualClock;

struct Setup {
    harness: Harness,
    prover: Arc<FakeProver>,
    broadcaster: Arc<FakeBroadcaster>,
    runner: VaultOperationRunner,
    states: Arc<Mutex<Vec<VaultState>>>,
}

fn setup(prover: FakeProver, signer: FakeSigner, broadcaster: FakeBroadcaster) -> Setup {
    let harness = Harness::new(vec![utxo(1, 200_000), utxo(2, 60_000)]);
    let prover = Arc::new(prover);
    let broadcaster = Arc::new(broadcaster);
    let states = Arc::new(Mutex::new(Vec::new()));

    let observed = states.clone();
    let runner = VaultOperationRunner::new(
        harness.selector.clone(),
        Arc::new(FakeBuilder),
        prover.clone(),
        Arc::new(signer),
        broadcaster.clone(),
        2.0,
    )
    .with_observer(Arc::new(move |ctx: &OperationContext| {
        observed.lock().unwrap().push(ctx.state());
    }));

    Setup {
        harness,
        prover,
        broadcaster,
        runner,
        states,
    }
}

async fn run_to_end(setup: &Setup) -> OperationContext {
    let ready = setup
        .runner
        .select(&create_initial_context(), open_request(150_000, 20_000))
        .await;
    assert_eq!(ready.state(), VaultState::Ready);
    setup.runner.execute(&ready).await
}

#[tokio::test]
async fn test_operation_succeeds_and_releases_utxos() {
    let setup = setup(
        FakeProver::default(),
        FakeSigner::default(),
        FakeBroadcaster::default(),
    );

    let done = run_to_end(&setup).await;

    assert_eq!(done.state(), VaultState::Success);
    assert_eq!(done.progress, 100);
    let result = done.result().unwrap();
    assert_eq!(result.commit_txid, format!("{:064x}", 1));
    assert_eq!(result.spell_txid, format!("{:064x}", 2));
    assert_eq!(result.vault_id, Some(format!("{}:0", result.spell_txid)));

    // Commit is relayed before the spell, both signed
    assert_eq!(
        *setup.broadcaster.relayed.lock().unwrap(),
        vec!["c051".to_string(), "5e51".to_string()]
    );

    // Fees are funded by the fee UTXO
    let request = setup.prover.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.funding_utxo, utxo(2, 60_000).id.to_string());
    assert_eq!(request.funding_utxo_value, 60_000);
    assert_eq!(request.fee_rate, 2.0);

    assert!(setup.harness.cache.entries().unwrap().is_empty());
    assert_eq!(
        *setup.states.lock().unwrap(),
        vec![
            VaultState::Selecting,
            VaultState::Ready,
            VaultState::Building,
            VaultState::Proving,
            VaultState::Signing,
            VaultState::Broadcasting,
            VaultState::Success,
        ]
    );
}

#[tokio::test]
async fn test_prover_rejection_burns_both_utxos_and_waits() {
    let setup = setup(
        FakeProver::rejecting("duplicate funding UTXO"),
        FakeSigner::default(),
        FakeBroadcaster::default(),
    );

    let failed = run_to_end(&setup).await;

    assert_eq!(failed.state(), VaultState::Waiting);
    assert_eq!(failed.error_type(), Some(ErrorType::UtxoBurned));
    assert_eq!(failed.next_available_at(), Some(START_MS + TTL_MS));
    for id in [utxo(1, 200_000).id, utxo(2, 60_000).id] {
        assert!(matches!(
            setup.harness.cache.check_availability(&id).unwrap(),
            Availability::Burned { .. }
        ));
    }

    // A retry now finds nothing to spend
    let retry = setup
        .runner
        .select(&failed, open_request(150_000, 20_000))
        .await;
    assert_eq!(retry.state(), VaultState::Waiting);
    assert_eq!(retry.error_type(), Some(ErrorType::AllReserved));

    // and succeeds once the prover's cache has expired
    setup.harness.clock.set(START_MS + TTL_MS);
    let ready = setup
        .runner
        .select(&retry, open_request(150_000, 20_000))
        .await;
    assert_eq!(ready.state(), VaultState::Ready);
}

#[tokio::test]
async fn test_user_rejection_is_an_error_but_still_burns() {
    let setup = setup(
        FakeProver::default(),
        FakeSigner {
            reject_with: Some("User rejected the request".to_string()),
        },
        FakeBroadcaster::default(),
    );

    let failed = run_to_end(&setup).await;

    assert_eq!(failed.state(), VaultState::Error);
    assert_eq!(failed.error_type(), Some(ErrorType::UserRejected));
    assert_eq!(failed.progress, 0);
    assert!(setup.broadcaster.relayed.lock().unwrap().is_empty());
    assert_eq!(setup.harness.cache.entries().unwrap().len(), 2);
}

#[tokio::test]
async fn test_spell_broadcast_failure_routes_to_error() {
    let setup = setup(
        FakeProver::default(),
        FakeSigner::default(),
        FakeBroadcaster {
            reject_at: Some((1, "sendrawtransaction RPC error: non-final".to_string())),
            ..FakeBroadcaster::default()
        },
    );

    let failed = run_to_end(&setup).await;

    assert_eq!(failed.state(), VaultState::Error);
    assert_eq!(failed.error_type(), Some(ErrorType::BroadcastFailed));
    assert_eq!(setup.broadcaster.relayed.lock().unwrap().len(), 1);
    assert_eq!(setup.harness.cache.entries().unwrap().len(), 2);
}

#[tokio::test]
async fn test_conflicting_reservation_waits_without_calling_prover() {
    let setup = setup(
        FakeProver::default(),
        FakeSigner::default(),
        FakeBroadcaster::default(),
    );
    let ready = setup
        .runner
        .select(&create_initial_context(), open_request(150_000, 20_000))
        .await;

    // Another attempt grabs the fee UTXO between selection and confirmation
    setup.harness.clock.advance(5_000);
    let fee = ready.fee_utxo().unwrap().id.clone();
    setup.harness.cache.reserve(&fee, json!({})).unwrap();

    let waiting = setup.runner.execute(&ready).await;

    assert_eq!(waiting.state(), VaultState::Waiting);
    assert_eq!(waiting.error_type(), Some(ErrorType::AllReserved));
    assert_eq!(waiting.next_available_at(), Some(START_MS + 5_000 + TTL_MS));
    assert_eq!(setup.prover.call_count(), 0);

    let collateral = ready.collateral_utxo().unwrap().id.clone();
    assert_eq!(
        setup.harness.cache.check_availability(&collateral).unwrap(),
        Availability::Available
    );
}

#[tokio::test]
async fn test_execute_requires_ready() {
    let setup = setup(
        FakeProver::default(),
        FakeSigner::default(),
        FakeBroadcaster::default(),
    );

    let idle = create_initial_context();
    assert_eq!(setup.runner.execute(&idle).await, idle);

    let done = run_to_end(&setup).await;
    assert_eq!(setup.runner.execute(&done).await, done);

    // Success must be reset before another start
    let unchanged = setup
        .runner
        .select(&done, open_request(150_000, 20_000))
        .await;
    assert_eq!(unchanged, done);

    // Both outputs are spent now
    setup.harness.wallet.set_utxos(vec![]);
    let empty = setup
        .runner
        .select(&reset(&done), open_request(150_000, 20_000))
        .await;
    assert_eq!(empty.state(), VaultState::Error);
    assert_eq!(empty.error_type(), Some(ErrorType::NoUtxos));
}

/// Prover that takes `delay_ms` of clock time before rejecting
struct SlowRejectingProver {
    clock: Arc<ManualClock>,
    delay_ms: i64,
}

#[async_trait]
impl SpellProver for SlowRejectingProver {
    async fn prove(&self, _request: &ProveRequest) -> Result<TransactionPair, ProverClientError> {
        self.clock.advance(self.delay_ms);
        Err(ProverClientError::Rejected {
            status: 400,
            body: "duplicate funding UTXO".to_string(),
        })
    }
}

#[tokio::test]
async fn test_waiting_countdown_starts_at_reservation() {
    let harness = Harness::new(vec![utxo(1, 200_000), utxo(2, 60_000)]);
    let runner = VaultOperationRunner::new(
        harness.selector.clone(),
        Arc::new(FakeBuilder),
        Arc::new(SlowRejectingProver {
            clock: harness.clock.clone(),
            delay_ms: 90_000,
        }),
        Arc::new(FakeSigner::default()),
        Arc::new(FakeBroadcaster::default()),
        2.0,
    );

    let ready = runner
        .select(&create_initial_context(), open_request(150_000, 20_000))
        .await;
    let failed = runner.execute(&ready).await;

    assert_eq!(failed.state(), VaultState::Waiting);
    assert_eq!(failed.next_available_at(), Some(START_MS + TTL_MS));

    harness.clock.set(START_MS + TTL_MS);
    let retried = runner
        .select(&failed, open_request(150_000, 20_000))
        .await;
    assert_eq!(retried.state(), VaultState::Ready);
}

#[tokio::test]
async fn test_runner_from_config_reserves_into_store_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.reservation.store_path = dir.path().join("state").join("reservations.json");
    config.network.fee_rate = 7.5;

    let runner = VaultOperationRunner::from_config(
        &config,
        Arc::new(FakeBuilder),
        Arc::new(FakeSigner::default()),
    )
    .unwrap();
    assert_eq!(runner.fee_rate(), 7.5);
    assert_eq!(runner.selector().cache().ttl_ms(), config.reservation.ttl_ms);

    runner
        .selector()
        .reserve_utxo(&utxo(1, 200_000).id, json!({}))
        .unwrap();
    let reopened = JsonFileStore::open(&config.reservation.store_path).unwrap();
    assert_eq!(
        reopened.keys_with_prefix("utxo-reservation:").unwrap(),
        vec![format!("utxo-reservation:{}", utxo(1, 200_000).id)]
    );
}

#[test]
fn test_runner_from_config_requires_prover_url() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.reservation.store_path = dir.path().join("reservations.json");
    config.network.prover_url = " ".to_string();

    let result = VaultOperationRunner::from_config(
        &config,
        Arc::new(FakeBuilder),
        Arc::new(FakeSigner::default()),
    );
    assert!(matches!(result, Err(RunnerSetupError::Prover(_))));
}

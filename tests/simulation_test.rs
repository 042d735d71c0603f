mod common;

use common::{open_request, utxo, FakeWallet};
use zkusd_operations::application::simulation::{
    mock_utxos, select_simulation_utxos, FailurePoint, SimulationDriver,
};
use zkusd_operations::domain::errors::ErrorType;

#[tokio::test]
async fn test_simulation_uses_real_utxos_when_reachable() {
    let wallet = FakeWallet::new(vec![utxo(1, 200_000), utxo(2, 60_000)]);
    let request = open_request(150_000, 20_000);

    let selection = select_simulation_utxos(&wallet, &request).await;

    assert_eq!(selection.collateral, utxo(1, 200_000));
    assert_eq!(selection.fee, utxo(2, 60_000));
}

#[tokio::test]
async fn test_simulation_falls_back_to_mock_utxos() {
    let request = open_request(150_000, 20_000);

    let unreachable = FakeWallet::failing("failed to fetch");
    assert_eq!(
        select_simulation_utxos(&unreachable, &request).await,
        mock_utxos(&request)
    );

    let too_small = FakeWallet::new(vec![utxo(1, 10_000)]);
    assert_eq!(
        select_simulation_utxos(&too_small, &request).await,
        mock_utxos(&request)
    );
}

#[tokio::test]
async fn test_identical_inputs_fabricate_identical_ids() {
    let request = open_request(150_000, 20_000);
    let selection = mock_utxos(&request);
    let driver = SimulationDriver::new(0.0);

    let first = driver.run(&request, &selection, |_| {}).await.unwrap();
    let second = driver.run(&request, &selection, |_| {}).await.unwrap();
    assert_eq!(first, second);

    let other = open_request(160_000, 20_000);
    let third = driver
        .run(&other, &mock_utxos(&other), |_| {})
        .await
        .unwrap();
    assert_ne!(first.spell_txid, third.spell_txid);
    assert_eq!(selection.collateral.txid.len(), 64);
}

#[tokio::test]
async fn test_each_failure_point_classifies() {
    let request = open_request(150_000, 20_000);
    let selection = mock_utxos(&request);

    let cases = [
        (FailurePoint::Proof, "proving", ErrorType::Unknown),
        (FailurePoint::Sign, "signing", ErrorType::UserRejected),
        (FailurePoint::Broadcast, "broadcast_commit", ErrorType::BroadcastFailed),
    ];
    for (point, step, expected) in cases {
        let driver = SimulationDriver::new(0.0).with_failure(Some(point));
        let mut last_step = "";
        let err = driver
            .run(&request, &selection, |p| last_step = p.step)
            .await
            .unwrap_err();
        assert_eq!(last_step, step);
        assert_eq!(err.error_type(), expected);
    }
}

//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use zkusd_operations::application::{CollaboratorError, SpellBuilder, TransactionSigner};
use zkusd_operations::domain::models::{
    OperationRequest, SelectedUtxos, SpellContext, TransactionPair, UtxoRecord, VaultOperation,
};
use zkusd_operations::domain::services::{UtxoAvailabilityCache, UtxoSelector};
use zkusd_operations::infrastructure::explorer::{
    ExplorerClientError, TransactionBroadcaster, UtxoSource,
};
use zkusd_operations::infrastructure::prover::{ProveRequest, ProverClientError, SpellProver};
use zkusd_operations::infrastructure::storage::InMemoryStore;
use zkusd_operations::utils::clock::ManualClock;

pub const TTL_MS: i64 = 3_600_000;
pub const START_MS: i64 = 1_700_000_000_000;
pub const ADDRESS: &str = "tb1qr25l2p34sv4wnz4q0cuh4g9jd9qh2eua6y5awq";

pub fn utxo(n: u8, value_sats: u64) -> UtxoRecord {
    UtxoRecord::new(format!("{:02x}", n).repeat(32), 0, value_sats, true)
}

pub fn open_request(collateral_sats: u64, fee_buffer_sats: u64) -> OperationRequest {
    OperationRequest::new(
        VaultOperation::Open {
            collateral_sats,
            debt_amount: 5_000,
        },
        ADDRESS,
        fee_buffer_sats,
    )
}

/// Wallet whose UTXO list can be swapped between calls
pub struct FakeWallet {
    utxos: Mutex<Vec<UtxoRecord>>,
    fail_with: Mutex<Option<String>>,
}

impl FakeWallet {
    pub fn new(utxos: Vec<UtxoRecord>) -> Self {
        Self {
            utxos: Mutex::new(utxos),
            fail_with: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        let wallet = Self::new(Vec::new());
        *wallet.fail_with.lock().unwrap() = Some(message.to_string());
        wallet
    }

    pub fn set_utxos(&self, utxos: Vec<UtxoRecord>) {
        *self.utxos.lock().unwrap() = utxos;
    }
}

#[async_trait]
impl UtxoSource for FakeWallet {
    async fn fetch_utxos(&self, _address: &str) -> Result<Vec<UtxoRecord>, ExplorerClientError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ExplorerClientError::Other(message));
        }
        Ok(self.utxos.lock().unwrap().clone())
    }
}

/// Selector wired to an in-memory store and a manual clock
pub struct Harness {
    pub wallet: Arc<FakeWallet>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<UtxoAvailabilityCache>,
    pub selector: UtxoSelector,
}

impl Harness {
    pub fn new(utxos: Vec<UtxoRecord>) -> Self {
        Self::with_wallet(Arc::new(FakeWallet::new(utxos)))
    }

    pub fn with_wallet(wallet: Arc<FakeWallet>) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(UtxoAvailabilityCache::new(
            store.clone(),
            clock.clone(),
            TTL_MS,
        ));
        let selector = UtxoSelector::new(wallet.clone(), cache.clone());
        Self {
            wallet,
            clock,
            store,
            cache,
            selector,
        }
    }
}

pub struct FakeBuilder;

#[async_trait]
impl SpellBuilder for FakeBuilder {
    async fn build_spell(
        &self,
        request: &OperationRequest,
        selection: &SelectedUtxos,
    ) -> Result<SpellContext, CollaboratorError> {
        Ok(SpellContext {
            spell: format!(
                "version: 9\napps:\n  $00: n/zkusd\nins:\n  - utxo_id: {}\n# {}\n",
                selection.collateral.id,
                request.operation.kind()
            ),
            binaries: Default::default(),
            prev_txs: vec!["0200000001".to_string()],
        })
    }
}

/// Prover that answers with a fixed pair or a scripted rejection
#[derive(Default)]
pub struct FakeProver {
    pub reject_with: Option<String>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<ProveRequest>>,
}

impl FakeProver {
    pub fn rejecting(body: &str) -> Self {
        Self {
            reject_with: Some(body.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpellProver for FakeProver {
    async fn prove(&self, request: &ProveRequest) -> Result<TransactionPair, ProverClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.reject_with {
            Some(body) => Err(ProverClientError::Rejected {
                status: 400,
                body: body.clone(),
            }),
            None => Ok(TransactionPair {
                commit_tx: "c0".to_string(),
                spell_tx: "5e".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeSigner {
    pub reject_with: Option<String>,
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    async fn sign(&self, proved: &TransactionPair) -> Result<TransactionPair, CollaboratorError> {
        if let Some(message) = &self.reject_with {
            return Err(message.clone().into());
        }
        Ok(TransactionPair {
            commit_tx: format!("{}51", proved.commit_tx),
            spell_tx: format!("{}51", proved.spell_tx),
        })
    }
}

/// Records every relayed transaction; optionally rejects the n-th one
#[derive(Default)]
pub struct FakeBroadcaster {
    pub reject_at: Option<(usize, String)>,
    pub relayed: Mutex<Vec<String>>,
}

#[async_trait]
impl TransactionBroadcaster for FakeBroadcaster {
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ExplorerClientError> {
        let mut relayed = self.relayed.lock().unwrap();
        if let Some((index, message)) = &self.reject_at {
            if *index == relayed.len() {
                return Err(ExplorerClientError::BroadcastRejected(message.clone()));
            }
        }
        relayed.push(raw_tx_hex.to_string());
        Ok(format!("{:064x}", relayed.len()))
    }
}

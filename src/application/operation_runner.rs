//! Vault operation runner
//!
//! Drives the pure operation machine against the real collaborators. Both
//! funding UTXOs are reserved before the spell leaves for the prover and are
//! burned on any later failure, since the prover may still hold them.

use async_trait::async_trait;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

use super::retry_handler::{RetryHandler, RetryingUtxoSource};
use crate::config::AppConfig;
use crate::domain::errors::ReservationError;
use crate::domain::models::{
    OperationRequest, OperationResult, SelectedUtxos, SpellContext, TransactionPair, VaultOperation,
    VaultState,
};
use crate::domain::services::operation_machine::{
    confirm, handle_error, handle_selection_result, handle_success, spell_built, start_broadcasting,
    start_operation, start_signing, OperationContext,
};
use crate::domain::services::{UtxoAvailabilityCache, UtxoSelector};
use crate::infrastructure::explorer::{ExplorerClient, ExplorerClientError, TransactionBroadcaster};
use crate::infrastructure::prover::{ProveRequest, ProverClient, ProverClientError, SpellProver};
use crate::infrastructure::storage::{JsonFileStore, StoreError};
use crate::utils::clock::SystemClock;
use crate::utils::logging;

/// Error returned by caller-provided collaborators
pub type CollaboratorError = Box<dyn Error + Send + Sync>;

/// Builds the spell describing an operation over the selected UTXOs
#[async_trait]
pub trait SpellBuilder: Send + Sync {
    async fn build_spell(
        &self,
        request: &OperationRequest,
        selection: &SelectedUtxos,
    ) -> Result<SpellContext, CollaboratorError>;
}

/// Wallet-side signing of the proved transactions
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, proved: &TransactionPair) -> Result<TransactionPair, CollaboratorError>;
}

/// Failure wiring the runner from configuration
#[derive(Debug, thiserror::Error)]
pub enum RunnerSetupError {
    #[error("failed to open reservation store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to create explorer client: {0}")]
    Explorer(#[from] ExplorerClientError),

    #[error("failed to create prover client: {0}")]
    Prover(#[from] ProverClientError),
}

/// Receives every context the runner produces
pub type ContextObserver = Arc<dyn Fn(&OperationContext) + Send + Sync>;

pub struct VaultOperationRunner {
    selector: UtxoSelector,
    builder: Arc<dyn SpellBuilder>,
    prover: Arc<dyn SpellProver>,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    fee_rate: f64,
    observer: Option<ContextObserver>,
}

impl VaultOperationRunner {
    pub fn new(
        selector: UtxoSelector,
        builder: Arc<dyn SpellBuilder>,
        prover: Arc<dyn SpellProver>,
        signer: Arc<dyn TransactionSigner>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        fee_rate: f64,
    ) -> Self {
        Self {
            selector,
            builder,
            prover,
            signer,
            broadcaster,
            fee_rate,
            observer: None,
        }
    }

    /// Wire the runner against the configured explorer, prover and on-disk
    /// reservation store. Spell building and signing stay with the caller.
    pub fn from_config(
        config: &AppConfig,
        builder: Arc<dyn SpellBuilder>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, RunnerSetupError> {
        let store = Arc::new(JsonFileStore::open(&config.reservation.store_path)?);
        let cache = Arc::new(UtxoAvailabilityCache::from_config(
            store,
            Arc::new(SystemClock),
            &config.reservation,
        ));

        let explorer = Arc::new(ExplorerClient::new(config)?);
        let source = Arc::new(RetryingUtxoSource::new(
            explorer.clone(),
            RetryHandler::new(),
        ));
        let prover = Arc::new(ProverClient::new(config)?);

        logging::log_info(&format!(
            "Vault operations on {} with reservations in {}",
            config.network.network,
            config.reservation.store_path.display()
        ));
        Ok(Self::new(
            UtxoSelector::new(source, cache),
            builder,
            prover,
            signer,
            explorer,
            config.network.fee_rate,
        ))
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn with_observer(mut self, observer: ContextObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn selector(&self) -> &UtxoSelector {
        &self.selector
    }

    /// Start an operation and resolve its UTXOs. Ends in `Ready`, `Waiting`
    /// or `Error`; an invalid start returns the context unchanged.
    pub async fn select(&self, ctx: &OperationContext, request: OperationRequest) -> OperationContext {
        let selecting = start_operation(ctx, request.clone());
        if selecting.state() != VaultState::Selecting {
            return selecting;
        }
        self.emit(&selecting);

        let next = match self
            .selector
            .select_utxo_pair(
                &request.address,
                request.collateral_amount(),
                request.fee_buffer_sats,
            )
            .await
        {
            Ok(result) => handle_selection_result(&selecting, &result),
            Err(e) => handle_error(&selecting, &e.to_string(), None),
        };
        self.emit(&next);
        next
    }

    /// Confirm a `Ready` context and carry it through build, prove, sign and
    /// broadcast
    pub async fn execute(&self, ctx: &OperationContext) -> OperationContext {
        let building = confirm(ctx);
        if building.state() != VaultState::Building {
            return building;
        }
        self.emit(&building);

        let (request, selection) = match (building.request(), building.selection()) {
            (Some(request), Some(selection)) => (request.clone(), selection.clone()),
            _ => return building,
        };

        let spell = match self.builder.build_spell(&request, &selection).await {
            Ok(spell) => spell,
            Err(e) => return self.fail(&building, &e.to_string(), None),
        };

        // Must be recorded before the prove request is sent
        if let Err(e) = self.reserve_selection(&request, &selection) {
            let next_available_at = match &e {
                ReservationError::AlreadyReserved { available_at, .. } => Some(*available_at),
                ReservationError::Store(_) => None,
            };
            return self.fail(&building, &e.to_string(), next_available_at);
        }

        let proving = spell_built(&building, spell.clone());
        self.emit(&proving);

        let prove_request =
            ProveRequest::new(&spell, &selection.fee, &request.address, self.fee_rate);
        let proved = match self.prover.prove(&prove_request).await {
            Ok(proved) => proved,
            Err(e) => return self.fail_reserved(&proving, &selection, &e.to_string()),
        };

        let signing = start_signing(&proving, proved.clone());
        self.emit(&signing);

        let signed = match self.signer.sign(&proved).await {
            Ok(signed) => signed,
            Err(e) => return self.fail_reserved(&signing, &selection, &e.to_string()),
        };

        let broadcasting = start_broadcasting(&signing, signed.clone());
        self.emit(&broadcasting);

        let commit_txid = match self.broadcaster.broadcast(&signed.commit_tx).await {
            Ok(txid) => txid,
            Err(e) => return self.fail_reserved(&broadcasting, &selection, &e.to_string()),
        };
        let spell_txid = match self.broadcaster.broadcast(&signed.spell_tx).await {
            Ok(txid) => txid,
            Err(e) => return self.fail_reserved(&broadcasting, &selection, &e.to_string()),
        };

        for utxo in [&selection.collateral, &selection.fee] {
            // Both transactions are already relayed; a store error must not
            // turn that into a failure
            if let Err(e) = self.selector.mark_success(&utxo.id) {
                logging::log_error(&format!(
                    "Failed to release reservation for {}: {}",
                    utxo.id, e
                ));
            }
        }

        let vault_id = vault_id_for(&request.operation, &spell_txid);
        let success = handle_success(
            &broadcasting,
            OperationResult {
                commit_txid,
                spell_txid,
                vault_id,
            },
        );
        self.emit(&success);
        success
    }

    fn reserve_selection(
        &self,
        request: &OperationRequest,
        selection: &SelectedUtxos,
    ) -> Result<(), ReservationError> {
        let payload = json!({
            "operation": request.operation.kind(),
            "collateral_utxo": selection.collateral.id,
            "fee_utxo": selection.fee.id,
        });

        self.selector
            .reserve_utxo(&selection.collateral.id, payload.clone())?;
        if let Err(e) = self.selector.reserve_utxo(&selection.fee.id, payload) {
            // Nothing reached the prover yet, so the collateral entry can go
            if let Err(release) = self.selector.mark_success(&selection.collateral.id) {
                logging::log_error(&format!(
                    "Failed to release reservation for {}: {}",
                    selection.collateral.id, release
                ));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Failure after the reservation: both UTXOs stay blocked until their TTL
    /// elapses
    fn fail_reserved(
        &self,
        ctx: &OperationContext,
        selection: &SelectedUtxos,
        message: &str,
    ) -> OperationContext {
        for utxo in [&selection.collateral, &selection.fee] {
            if let Err(e) = self.selector.mark_burned(&utxo.id, message) {
                logging::log_error(&format!("Failed to burn reservation for {}: {}", utxo.id, e));
            }
        }
        // Entries keep their reservation time, so this is the real unlock
        let cache = self.selector.cache();
        let next_available_at = [&selection.collateral, &selection.fee]
            .iter()
            .filter_map(|utxo| cache.check_availability(&utxo.id).ok()?.available_at())
            .min()
            .unwrap_or_else(|| cache.now_ms() + cache.ttl_ms());
        self.fail(ctx, message, Some(next_available_at))
    }

    fn fail(
        &self,
        ctx: &OperationContext,
        message: &str,
        next_available_at: Option<i64>,
    ) -> OperationContext {
        logging::log_error(&format!(
            "Vault operation failed during {}: {}",
            ctx.state(),
            message
        ));
        let next = handle_error(ctx, message, next_available_at);
        self.emit(&next);
        next
    }

    fn emit(&self, ctx: &OperationContext) {
        logging::log_debug(&format!(
            "Operation state {} ({}%): {}",
            ctx.state(),
            ctx.progress,
            ctx.status_message
        ));
        if let Some(observer) = &self.observer {
            observer(ctx);
        }
    }
}

/// A new vault is identified by the spell output that carries it
fn vault_id_for(operation: &VaultOperation, spell_txid: &str) -> Option<String> {
    match operation {
        VaultOperation::Open { .. } => Some(format!("{}:0", spell_txid)),
        VaultOperation::Adjust { vault_id, .. } | VaultOperation::Close { vault_id } => {
            Some(vault_id.clone())
        }
    }
}

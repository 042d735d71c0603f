//! Simulation Driver
//!
//! Scripted walk through the operation steps for demos and offline runs. No
//! spell is proved and nothing is broadcast; step timings and progress mirror
//! a real run and failures can be injected at the prove, sign or broadcast
//! step. Identifiers are derived from the inputs with FNV-1a so identical runs
//! produce identical results.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::config::SimulationConfig;
use crate::domain::errors::ErrorType;
use crate::domain::models::{
    OperationRequest, OperationResult, SelectedUtxos, SpellContext, TransactionPair, UtxoRecord,
    VaultOperation, VaultState, DUST_LIMIT_SATS,
};
use crate::domain::services::operation_machine::{
    confirm, handle_selection_result, spell_built, start_broadcasting, start_signing,
    update_proving_progress, OperationContext,
};
use crate::domain::services::utxo_selector::{choose_pair, UtxoPairResult};
use crate::domain::services::parse_error_type;
use crate::infrastructure::explorer::UtxoSource;
use crate::utils::logging;

/// One scripted step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationStep {
    pub name: &'static str,
    pub duration_ms: u64,
    pub progress: u8,
    pub state: VaultState,
    pub message: &'static str,
}

pub const SIMULATION_STEPS: [SimulationStep; 11] = [
    SimulationStep {
        name: "selecting",
        duration_ms: 800,
        progress: 10,
        state: VaultState::Selecting,
        message: "Selecting UTXOs...",
    },
    SimulationStep {
        name: "validating",
        duration_ms: 600,
        progress: 15,
        state: VaultState::Selecting,
        message: "Validating UTXO availability...",
    },
    SimulationStep {
        name: "ready",
        duration_ms: 400,
        progress: 20,
        state: VaultState::Ready,
        message: "UTXOs selected",
    },
    SimulationStep {
        name: "building",
        duration_ms: 1000,
        progress: 30,
        state: VaultState::Building,
        message: "Building spell...",
    },
    SimulationStep {
        name: "loading_binaries",
        duration_ms: 1200,
        progress: 40,
        state: VaultState::Building,
        message: "Loading contract binaries...",
    },
    SimulationStep {
        name: "proving_init",
        duration_ms: 1500,
        progress: 50,
        state: VaultState::Proving,
        message: "Initializing prover...",
    },
    SimulationStep {
        name: "proving",
        duration_ms: 4000,
        progress: 75,
        state: VaultState::Proving,
        message: "Generating zero-knowledge proof...",
    },
    SimulationStep {
        name: "signing",
        duration_ms: 1500,
        progress: 85,
        state: VaultState::Signing,
        message: "Waiting for wallet signature...",
    },
    SimulationStep {
        name: "broadcast_commit",
        duration_ms: 1200,
        progress: 92,
        state: VaultState::Broadcasting,
        message: "Broadcasting commit transaction...",
    },
    SimulationStep {
        name: "broadcast_spell",
        duration_ms: 1200,
        progress: 97,
        state: VaultState::Broadcasting,
        message: "Broadcasting spell transaction...",
    },
    SimulationStep {
        name: "success",
        duration_ms: 0,
        progress: 100,
        state: VaultState::Success,
        message: "Operation complete",
    },
];

/// Where an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePoint {
    Proof,
    Sign,
    Broadcast,
}

impl FailurePoint {
    /// Step during which the failure fires, halfway through its duration
    pub fn step_name(&self) -> &'static str {
        match self {
            FailurePoint::Proof => "proving",
            FailurePoint::Sign => "signing",
            FailurePoint::Broadcast => "broadcast_commit",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailurePoint::Proof => "Proof generation failed: prover returned an error",
            FailurePoint::Sign => "User rejected the signing request",
            FailurePoint::Broadcast => "Broadcast failed: transaction rejected by the mempool",
        }
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("{message}")]
    StepFailed {
        step: &'static str,
        message: String,
    },
}

impl SimulationError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            SimulationError::StepFailed { message, .. } => parse_error_type(message),
        }
    }
}

/// Emitted at the start of every step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationProgress {
    pub step: &'static str,
    pub state: VaultState,
    pub progress: u8,
    pub message: String,
}

impl From<&SimulationStep> for SimulationProgress {
    fn from(step: &SimulationStep) -> Self {
        Self {
            step: step.name,
            state: step.state,
            progress: step.progress,
            message: step.message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationDriver {
    time_scale: f64,
    fail_at: Option<FailurePoint>,
}

impl SimulationDriver {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: if time_scale.is_finite() {
                time_scale.max(0.0)
            } else {
                1.0
            },
            fail_at: None,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.time_scale)
    }

    pub fn with_failure(mut self, fail_at: Option<FailurePoint>) -> Self {
        self.fail_at = fail_at;
        self
    }

    /// Total scripted time at the current scale
    pub fn total_duration(&self) -> Duration {
        SIMULATION_STEPS
            .iter()
            .map(|s| self.scaled(s.duration_ms))
            .sum()
    }

    /// Walk every step, calling `on_progress` before each one
    pub async fn run<F>(
        &self,
        request: &OperationRequest,
        selection: &SelectedUtxos,
        mut on_progress: F,
    ) -> Result<OperationResult, SimulationError>
    where
        F: FnMut(&SimulationProgress),
    {
        logging::log_info(&format!(
            "Simulating {} for {} (failure point: {:?})",
            request.operation.kind(),
            request.address,
            self.fail_at
        ));

        for step in SIMULATION_STEPS.iter() {
            on_progress(&SimulationProgress::from(step));

            if let Some(fail_at) = self.fail_at.filter(|f| f.step_name() == step.name) {
                self.pause(step.duration_ms / 2).await;
                logging::log_warning(&format!(
                    "Simulated failure during {}: {}",
                    step.name,
                    fail_at.message()
                ));
                return Err(SimulationError::StepFailed {
                    step: step.name,
                    message: fail_at.message().to_string(),
                });
            }

            self.pause(step.duration_ms).await;
        }

        Ok(simulated_result(request, selection))
    }

    async fn pause(&self, duration_ms: u64) {
        let duration = self.scaled(duration_ms);
        if !duration.is_zero() {
            sleep(duration).await;
        }
    }

    fn scaled(&self, duration_ms: u64) -> Duration {
        Duration::from_micros((duration_ms as f64 * self.time_scale * 1000.0).round() as u64)
    }
}

/// Mirror a progress update onto the operation machine so simulated runs go
/// through the same states as real ones
pub fn advance_context(
    ctx: &OperationContext,
    update: &SimulationProgress,
    request: &OperationRequest,
    selection: &SelectedUtxos,
) -> OperationContext {
    let mut next = match (ctx.state(), update.state) {
        (VaultState::Selecting, VaultState::Ready) => handle_selection_result(
            ctx,
            &UtxoPairResult::Ready {
                collateral: selection.collateral.clone(),
                fee: selection.fee.clone(),
            },
        ),
        (VaultState::Ready, VaultState::Building) => confirm(ctx),
        (VaultState::Building, VaultState::Proving) => spell_built(ctx, simulated_spell(request)),
        (VaultState::Proving, VaultState::Proving) => {
            update_proving_progress(ctx, &update.message)
        }
        (VaultState::Proving, VaultState::Signing) => start_signing(ctx, simulated_pair()),
        (VaultState::Signing, VaultState::Broadcasting) => {
            start_broadcasting(ctx, simulated_pair())
        }
        _ => ctx.clone(),
    };

    // Success is applied by the caller once the result exists. The scripted
    // step table owns the displayed progress, including inside proving.
    if next.state() == update.state {
        next.progress = update.progress;
        next.status_message = update.message.clone();
    }
    next
}

/// Use the wallet's real UTXOs when a pair can be formed from them, mock
/// ones otherwise
pub async fn select_simulation_utxos(
    source: &dyn UtxoSource,
    request: &OperationRequest,
) -> SelectedUtxos {
    let collateral_amount = request.collateral_amount();
    match source.fetch_utxos(&request.address).await {
        Ok(utxos) => {
            match choose_pair(&utxos, collateral_amount, request.fee_buffer_sats) {
                UtxoPairResult::Ready { collateral, fee } => {
                    return SelectedUtxos { collateral, fee };
                }
                other => logging::log_warning(&format!(
                    "No usable UTXO pair for simulation ({}); using mock UTXOs",
                    other.message()
                )),
            }
        }
        Err(e) => logging::log_warning(&format!(
            "Failed to fetch UTXOs for simulation ({}); using mock UTXOs",
            e
        )),
    }
    mock_utxos(request)
}

/// Two confirmed fabricated outputs covering the request
pub fn mock_utxos(request: &OperationRequest) -> SelectedUtxos {
    let collateral_value = request.collateral_amount().max(DUST_LIMIT_SATS);
    let fee_value = request.fee_buffer_sats.max(DUST_LIMIT_SATS);
    SelectedUtxos {
        collateral: UtxoRecord::new(
            fabricate_id(&[&request.address, "mock-collateral"]),
            0,
            collateral_value,
            true,
        ),
        fee: UtxoRecord::new(
            fabricate_id(&[&request.address, "mock-fee"]),
            1,
            fee_value,
            true,
        ),
    }
}

fn simulated_result(request: &OperationRequest, selection: &SelectedUtxos) -> OperationResult {
    let operation = serde_json::to_string(&request.operation).unwrap_or_default();
    let seed = [
        request.address.as_str(),
        operation.as_str(),
        selection.collateral.id.as_str(),
        selection.fee.id.as_str(),
    ];

    let id_for = |label: &str| {
        let mut parts = seed.to_vec();
        parts.push(label);
        fabricate_id(&parts)
    };

    let commit_txid = id_for("commit");
    let spell_txid = id_for("spell");
    let vault_id = match &request.operation {
        VaultOperation::Open { .. } => id_for("vault"),
        VaultOperation::Adjust { vault_id, .. } | VaultOperation::Close { vault_id } => {
            vault_id.clone()
        }
    };

    OperationResult {
        commit_txid,
        spell_txid,
        vault_id: Some(vault_id),
    }
}

fn simulated_spell(request: &OperationRequest) -> SpellContext {
    SpellContext {
        spell: format!("# simulated {} spell\n", request.operation.kind()),
        binaries: Default::default(),
        prev_txs: Vec::new(),
    }
}

fn simulated_pair() -> TransactionPair {
    TransactionPair {
        commit_tx: String::new(),
        spell_tx: String::new(),
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// 64 hex characters: four 64-bit FNV-1a rounds over the joined parts
pub fn fabricate_id(parts: &[&str]) -> String {
    let joined = parts.join("|");
    (0u8..4)
        .map(|round| {
            let mut bytes = joined.as_bytes().to_vec();
            bytes.push(round);
            format!("{:016x}", fnv1a(&bytes))
        })
        .collect()
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::utxo::UtxoRecord;

/// Smallest output value the network relays; floor for operations that move
/// no collateral but still need a funding input.
pub const DUST_LIMIT_SATS: u64 = 546;

/// Observable state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    Idle,
    Selecting,
    Ready,
    Building,
    Proving,
    Signing,
    Broadcasting,
    Success,
    Waiting,
    Error,
}

impl VaultState {
    pub const ALL: [VaultState; 10] = [
        VaultState::Idle,
        VaultState::Selecting,
        VaultState::Ready,
        VaultState::Building,
        VaultState::Proving,
        VaultState::Signing,
        VaultState::Broadcasting,
        VaultState::Success,
        VaultState::Waiting,
        VaultState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VaultState::Idle => "idle",
            VaultState::Selecting => "selecting",
            VaultState::Ready => "ready",
            VaultState::Building => "building",
            VaultState::Proving => "proving",
            VaultState::Signing => "signing",
            VaultState::Broadcasting => "broadcasting",
            VaultState::Success => "success",
            VaultState::Waiting => "waiting",
            VaultState::Error => "error",
        }
    }
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collateral vault operation a user can submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VaultOperation {
    Open {
        collateral_sats: u64,
        debt_amount: u64,
    },
    Adjust {
        vault_id: String,
        collateral_delta_sats: i64,
        debt_delta: i64,
    },
    Close {
        vault_id: String,
    },
}

impl VaultOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            VaultOperation::Open { .. } => "open_vault",
            VaultOperation::Adjust { .. } => "adjust_vault",
            VaultOperation::Close { .. } => "close_vault",
        }
    }

    /// Sats the collateral UTXO has to cover
    pub fn collateral_requirement(&self) -> u64 {
        match self {
            VaultOperation::Open {
                collateral_sats, ..
            } => *collateral_sats,
            VaultOperation::Adjust {
                collateral_delta_sats,
                ..
            } => (*collateral_delta_sats).max(0).unsigned_abs().max(DUST_LIMIT_SATS),
            VaultOperation::Close { .. } => DUST_LIMIT_SATS,
        }
    }
}

/// An operation together with where it is funded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: VaultOperation,
    /// Wallet address holding the funding UTXOs; also receives change
    pub address: String,
    pub fee_buffer_sats: u64,
}

impl OperationRequest {
    pub fn new(operation: VaultOperation, address: impl Into<String>, fee_buffer_sats: u64) -> Self {
        Self {
            operation,
            address: address.into(),
            fee_buffer_sats,
        }
    }

    pub fn collateral_amount(&self) -> u64 {
        self.operation.collateral_requirement()
    }
}

/// The two UTXOs chosen for an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedUtxos {
    pub collateral: UtxoRecord,
    pub fee: UtxoRecord,
}

/// Spell ready to be submitted to the prover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellContext {
    /// Serialized spell (YAML) describing the state transition
    pub spell: String,
    /// App binaries keyed by verification key, base64 encoded
    #[serde(default)]
    pub binaries: BTreeMap<String, String>,
    /// Raw hex of every transaction the spell spends from
    #[serde(default)]
    pub prev_txs: Vec<String>,
}

/// Commit and spell transactions as hex, either proved or signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPair {
    pub commit_tx: String,
    pub spell_tx: String,
}

/// Outcome of a broadcast operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub commit_txid: String,
    pub spell_txid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::infrastructure::explorer::ExplorerClientError;
use crate::infrastructure::storage::StoreError;

/// Fixed classification of every failure an operation can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    UtxoBurned,
    InsufficientFunds,
    NeedSplit,
    NoUtxos,
    AllReserved,
    NetworkError,
    UserRejected,
    BroadcastFailed,
    ValidationError,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::UtxoBurned => "utxo_burned",
            ErrorType::InsufficientFunds => "insufficient_funds",
            ErrorType::NeedSplit => "need_split",
            ErrorType::NoUtxos => "no_utxos",
            ErrorType::AllReserved => "all_reserved",
            ErrorType::NetworkError => "network_error",
            ErrorType::UserRejected => "user_rejected",
            ErrorType::BroadcastFailed => "broadcast_failed",
            ErrorType::ValidationError => "validation_error",
            ErrorType::Unknown => "unknown",
        }
    }

    /// Conditions that clear on their own once a reservation expires.
    /// Everything else needs the user to act.
    pub fn is_time_recoverable(&self) -> bool {
        matches!(self, ErrorType::UtxoBurned | ErrorType::AllReserved)
    }

    /// Hard stop: the UTXO must be split outside this crate before retrying
    pub fn requires_manual_split(&self) -> bool {
        matches!(self, ErrorType::NeedSplit)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "reservation TTL ({ttl_ms} ms) does not match the prover cache retention ({retention_ms} ms)"
    )]
    RetentionMismatch { ttl_ms: i64, retention_ms: i64 },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the reservation cache
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("UTXO {utxo_id} is already reserved until {available_at}")]
    AlreadyReserved { utxo_id: String, available_at: i64 },

    #[error("reservation store error: {0}")]
    Store(#[from] StoreError),
}

impl ReservationError {
    /// Error type this failure maps to when it reaches the state machine
    pub fn error_type(&self) -> ErrorType {
        match self {
            ReservationError::AlreadyReserved { .. } => ErrorType::AllReserved,
            ReservationError::Store(_) => ErrorType::Unknown,
        }
    }
}

/// Unexpected failures while selecting UTXOs. Expected outcomes such as
/// insufficient funds are selection results, not errors.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("failed to fetch UTXOs: {0}")]
    Source(#[from] ExplorerClientError),

    #[error("reservation store error: {0}")]
    Store(#[from] StoreError),
}

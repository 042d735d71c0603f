use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::utxo::UtxoId;

/// Lifecycle of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// A UTXO handed to the prover, as persisted by the availability cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub utxo_id: UtxoId,
    pub status: ReservationStatus,
    /// Opaque description of the attempt (spell summary, operation kind)
    pub attempt_payload: Value,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ReservationEntry {
    pub fn pending(utxo_id: UtxoId, attempt_payload: Value, created_at: i64) -> Self {
        Self {
            utxo_id,
            status: ReservationStatus::Pending,
            attempt_payload,
            created_at,
            failure_reason: None,
        }
    }

    pub fn available_at(&self, ttl_ms: i64) -> i64 {
        self.created_at.saturating_add(ttl_ms)
    }

    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms >= self.available_at(ttl_ms)
    }
}

/// Answer of the availability cache for one UTXO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    /// An attempt is in flight or inside its TTL window
    Reserved {
        available_at: i64,
        reason: Option<String>,
    },
    /// A prior attempt failed; the prover may still hold or reject this UTXO
    Burned {
        available_at: i64,
        reason: Option<String>,
    },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn available_at(&self) -> Option<i64> {
        match self {
            Availability::Available => None,
            Availability::Reserved { available_at, .. }
            | Availability::Burned { available_at, .. } => Some(*available_at),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Availability::Available => None,
            Availability::Reserved { reason, .. } | Availability::Burned { reason, .. } => {
                reason.as_deref()
            }
        }
    }
}

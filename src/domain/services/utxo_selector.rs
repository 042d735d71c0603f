//! UTXO Selector
//!
//! Turns "N sats of collateral plus M sats of fees" into concrete wallet
//! outputs, skipping anything the availability cache still considers
//! committed to a prover attempt.
//!
//! Ordering is total (value, then confirmation, then id) so that the same
//! wallet state always produces the same choice.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::sync::Arc;

use super::availability_cache::UtxoAvailabilityCache;
use crate::domain::errors::{ErrorType, ReservationError, SelectorError};
use crate::domain::models::{Availability, ReservationEntry, UtxoId, UtxoRecord};
use crate::infrastructure::explorer::UtxoSource;
use crate::infrastructure::storage::StoreError;
use crate::utils::logging;

/// Outcome tag shared by both selection entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Ready,
    NeedSplit,
    InsufficientFunds,
    AllReserved,
    NoUtxos,
}

impl SelectionStatus {
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            SelectionStatus::Ready => None,
            SelectionStatus::NeedSplit => Some(ErrorType::NeedSplit),
            SelectionStatus::InsufficientFunds => Some(ErrorType::InsufficientFunds),
            SelectionStatus::AllReserved => Some(ErrorType::AllReserved),
            SelectionStatus::NoUtxos => Some(ErrorType::NoUtxos),
        }
    }
}

/// A wallet output currently blocked by the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedUtxo {
    pub utxo: UtxoRecord,
    pub available_at: i64,
    pub reason: Option<String>,
    /// A prior attempt failed rather than still being in flight
    pub burned: bool,
}

/// The wallet's outputs split by what the cache allows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityView {
    pub available: Vec<UtxoRecord>,
    pub reserved: Vec<ReservedUtxo>,
}

impl AvailabilityView {
    pub fn is_empty(&self) -> bool {
        self.available.is_empty() && self.reserved.is_empty()
    }

    pub fn total_available(&self) -> u64 {
        self.available.iter().map(|u| u.value_sats).sum()
    }

    /// When the soonest reserved UTXO unlocks
    pub fn next_available_at(&self) -> Option<i64> {
        self.reserved.iter().map(|r| r.available_at).min()
    }
}

/// Result of a collateral + fee selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UtxoPairResult {
    Ready {
        collateral: UtxoRecord,
        fee: UtxoRecord,
    },
    /// A single output covers everything but must be split into two first
    NeedSplit { utxo: UtxoRecord, required: u64 },
    InsufficientFunds { total_available: u64, required: u64 },
    AllReserved {
        next_available_at: i64,
        reserved_count: usize,
    },
    NoUtxos,
}

impl UtxoPairResult {
    pub fn status(&self) -> SelectionStatus {
        match self {
            UtxoPairResult::Ready { .. } => SelectionStatus::Ready,
            UtxoPairResult::NeedSplit { .. } => SelectionStatus::NeedSplit,
            UtxoPairResult::InsufficientFunds { .. } => SelectionStatus::InsufficientFunds,
            UtxoPairResult::AllReserved { .. } => SelectionStatus::AllReserved,
            UtxoPairResult::NoUtxos => SelectionStatus::NoUtxos,
        }
    }

    pub fn message(&self) -> String {
        match self {
            UtxoPairResult::Ready { collateral, fee } => format!(
                "Selected collateral UTXO {} ({} sats) and fee UTXO {} ({} sats)",
                collateral.id, collateral.value_sats, fee.id, fee.value_sats
            ),
            UtxoPairResult::NeedSplit { utxo, required } => format!(
                "Only one UTXO available ({} sats) for {} sats required. Split it into separate collateral and fee outputs before retrying",
                utxo.value_sats, required
            ),
            UtxoPairResult::InsufficientFunds {
                total_available,
                required,
            } => format!(
                "Insufficient funds: {} sats available, {} sats required",
                total_available, required
            ),
            UtxoPairResult::AllReserved {
                next_available_at,
                reserved_count,
            } => format!(
                "All {} UTXOs are reserved by pending operations; next one unlocks at {}",
                reserved_count, next_available_at
            ),
            UtxoPairResult::NoUtxos => "No UTXOs found for this address".to_string(),
        }
    }
}

/// Result of a single-UTXO selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UtxoSelectResult {
    Selected { utxo: UtxoRecord },
    InsufficientFunds { total_available: u64, required: u64 },
    AllReserved { next_available_at: i64 },
    NoUtxos,
}

impl UtxoSelectResult {
    pub fn status(&self) -> SelectionStatus {
        match self {
            UtxoSelectResult::Selected { .. } => SelectionStatus::Ready,
            UtxoSelectResult::InsufficientFunds { .. } => SelectionStatus::InsufficientFunds,
            UtxoSelectResult::AllReserved { .. } => SelectionStatus::AllReserved,
            UtxoSelectResult::NoUtxos => SelectionStatus::NoUtxos,
        }
    }

    pub fn utxo(&self) -> Option<&UtxoRecord> {
        match self {
            UtxoSelectResult::Selected { utxo } => Some(utxo),
            _ => None,
        }
    }
}

/// Selects funding UTXOs for vault operations
#[derive(Clone)]
pub struct UtxoSelector {
    source: Arc<dyn UtxoSource>,
    cache: Arc<UtxoAvailabilityCache>,
}

impl UtxoSelector {
    pub fn new(source: Arc<dyn UtxoSource>, cache: Arc<UtxoAvailabilityCache>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<UtxoAvailabilityCache> {
        &self.cache
    }

    /// Fetch the wallet's outputs and split them by availability
    pub async fn partition(&self, address: &str) -> Result<AvailabilityView, SelectorError> {
        let utxos = self.source.fetch_utxos(address).await?;
        Ok(self.classify(utxos)?)
    }

    /// Pick a collateral UTXO and a distinct fee UTXO
    pub async fn select_utxo_pair(
        &self,
        address: &str,
        collateral_amount: u64,
        fee_buffer: u64,
    ) -> Result<UtxoPairResult, SelectorError> {
        let view = self.partition(address).await?;

        if view.is_empty() {
            return Ok(UtxoPairResult::NoUtxos);
        }
        if view.available.is_empty() {
            // Non-empty reserved list, so the minimum exists
            let next_available_at = view.next_available_at().unwrap_or_default();
            return Ok(UtxoPairResult::AllReserved {
                next_available_at,
                reserved_count: view.reserved.len(),
            });
        }

        let result = choose_pair(&view.available, collateral_amount, fee_buffer);
        logging::log_debug(&format!(
            "Pair selection for {} ({} available, {} reserved): {}",
            address,
            view.available.len(),
            view.reserved.len(),
            result.message()
        ));
        Ok(result)
    }

    /// Pick one UTXO worth at least `min_value`
    pub async fn select_utxo(
        &self,
        address: &str,
        min_value: u64,
    ) -> Result<UtxoSelectResult, SelectorError> {
        let view = self.partition(address).await?;

        if view.is_empty() {
            return Ok(UtxoSelectResult::NoUtxos);
        }
        if view.available.is_empty() {
            return Ok(UtxoSelectResult::AllReserved {
                next_available_at: view.next_available_at().unwrap_or_default(),
            });
        }

        Ok(match choose_single(&view.available, min_value) {
            Some(utxo) => UtxoSelectResult::Selected { utxo },
            None => UtxoSelectResult::InsufficientFunds {
                total_available: view.total_available(),
                required: min_value,
            },
        })
    }

    pub fn reserve_utxo(
        &self,
        utxo_id: &UtxoId,
        attempt_payload: Value,
    ) -> Result<ReservationEntry, ReservationError> {
        self.cache.reserve(utxo_id, attempt_payload)
    }

    pub fn mark_success(&self, utxo_id: &UtxoId) -> Result<(), StoreError> {
        self.cache.mark_success(utxo_id)
    }

    pub fn mark_burned(&self, utxo_id: &UtxoId, reason: &str) -> Result<(), StoreError> {
        self.cache.mark_failed(utxo_id, reason)
    }

    fn classify(&self, utxos: Vec<UtxoRecord>) -> Result<AvailabilityView, StoreError> {
        let mut view = AvailabilityView::default();
        for utxo in utxos {
            match self.cache.check_availability(&utxo.id)? {
                Availability::Available => view.available.push(utxo),
                Availability::Reserved {
                    available_at,
                    reason,
                } => view.reserved.push(ReservedUtxo {
                    utxo,
                    available_at,
                    reason,
                    burned: false,
                }),
                Availability::Burned {
                    available_at,
                    reason,
                } => view.reserved.push(ReservedUtxo {
                    utxo,
                    available_at,
                    reason,
                    burned: true,
                }),
            }
        }
        Ok(view)
    }
}

/// Pair selection over already-available outputs.
///
/// 1. the largest output covering the collateral, with the smallest other
///    output covering the fee
/// 2. a lone output covering both amounts needs splitting
/// 3. any other collateral-covering output paired with a fee-covering one
/// 4. otherwise insufficient funds
pub fn choose_pair(available: &[UtxoRecord], collateral_amount: u64, fee_buffer: u64) -> UtxoPairResult {
    if available.is_empty() {
        return UtxoPairResult::NoUtxos;
    }

    let mut sorted = available.to_vec();
    sorted.sort_by_key(|u| (Reverse(u.value_sats), !u.confirmed, u.id.clone()));

    let required = collateral_amount.saturating_add(fee_buffer);

    if let Some(largest) = sorted.first().filter(|u| u.value_sats >= collateral_amount) {
        if let Some(fee) = smallest_covering(&sorted, fee_buffer, &largest.id) {
            return UtxoPairResult::Ready {
                collateral: largest.clone(),
                fee,
            };
        }
    }

    if sorted.len() == 1 && sorted[0].value_sats >= required {
        return UtxoPairResult::NeedSplit {
            utxo: sorted[0].clone(),
            required,
        };
    }

    for candidate in sorted
        .iter()
        .skip(1)
        .filter(|u| u.value_sats >= collateral_amount)
    {
        if let Some(fee) = smallest_covering(&sorted, fee_buffer, &candidate.id) {
            return UtxoPairResult::Ready {
                collateral: candidate.clone(),
                fee,
            };
        }
    }

    UtxoPairResult::InsufficientFunds {
        total_available: sorted.iter().map(|u| u.value_sats).sum(),
        required,
    }
}

/// Smallest adequate output, confirmed ones first. Spending the smallest
/// output that works keeps large ones free for larger operations.
pub fn choose_single(available: &[UtxoRecord], min_value: u64) -> Option<UtxoRecord> {
    available
        .iter()
        .filter(|u| u.value_sats >= min_value)
        .min_by_key(|u| (!u.confirmed, u.value_sats, u.id.clone()))
        .cloned()
}

fn smallest_covering(sorted: &[UtxoRecord], amount: u64, exclude: &UtxoId) -> Option<UtxoRecord> {
    sorted
        .iter()
        .filter(|u| &u.id != exclude && u.value_sats >= amount)
        .min_by_key(|u| (u.value_sats, !u.confirmed, u.id.clone()))
        .cloned()
}

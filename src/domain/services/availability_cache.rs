//! UTXO Availability Cache
//!
//! Tracks which UTXOs have been handed to the prover so the same output is
//! never committed to two attempts at once.
//!
//! Policy:
//! - `reserve` is called before the prove request leaves the process
//! - a pending or failed entry blocks re-selection until `created_at + ttl`
//! - success removes the entry (the UTXO is spent and drops out of the wallet)
//! - the TTL mirrors the prover's own attempt cache retention
//!
//! The cache is local to one store. It cannot see attempts made from another
//! device or profile for the same wallet, so it is a liveness aid only.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ReservationConfig;
use crate::domain::errors::ReservationError;
use crate::domain::models::{Availability, ReservationEntry, ReservationStatus, UtxoId};
use crate::infrastructure::storage::{KeyValueStore, StoreError};
use crate::utils::clock::Clock;
use crate::utils::logging;

/// Key prefix of every reservation in the backing store
pub const RESERVATION_KEY_PREFIX: &str = "utxo-reservation:";

const PENDING_REASON: &str = "UTXO is committed to an in-flight prover attempt";

/// Reservation cache over an injected key-value store
pub struct UtxoAvailabilityCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    /// Serialises every read-modify-write against the store
    lock: Mutex<()>,
}

impl UtxoAvailabilityCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl_ms: i64) -> Self {
        Self {
            store,
            clock,
            ttl_ms,
            lock: Mutex::new(()),
        }
    }

    /// Build the cache from configuration, logging loudly if the TTL drifted
    /// from the prover's retention window
    pub fn from_config(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &ReservationConfig,
    ) -> Self {
        let cache = Self::new(store, clock, config.ttl_ms);
        cache.warn_on_retention_mismatch(config.prover_cache_retention_ms);
        cache
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Returns true when the local TTL matches the prover retention window
    pub fn warn_on_retention_mismatch(&self, retention_ms: i64) -> bool {
        if retention_ms != self.ttl_ms {
            logging::log_error(&format!(
                "Reservation TTL {}ms differs from prover cache retention {}ms; UTXOs may be re-submitted while the prover still holds them",
                self.ttl_ms, retention_ms
            ));
            return false;
        }
        true
    }

    /// Current availability of a UTXO. Expired entries are dropped on read.
    pub fn check_availability(&self, utxo_id: &UtxoId) -> Result<Availability, StoreError> {
        let _guard = self.guard();
        let now = self.clock.now_ms();

        let entry = match self.load_live(utxo_id, now)? {
            Some(entry) => entry,
            None => return Ok(Availability::Available),
        };

        let available_at = entry.available_at(self.ttl_ms);
        Ok(match entry.status {
            ReservationStatus::Pending => Availability::Reserved {
                available_at,
                reason: Some(PENDING_REASON.to_string()),
            },
            ReservationStatus::Failed => Availability::Burned {
                available_at,
                reason: entry.failure_reason,
            },
            ReservationStatus::Succeeded => Availability::Available,
        })
    }

    /// Record that `utxo_id` is about to be sent to the prover.
    ///
    /// Fails if a pending or failed entry is still inside its TTL window.
    pub fn reserve(
        &self,
        utxo_id: &UtxoId,
        attempt_payload: Value,
    ) -> Result<ReservationEntry, ReservationError> {
        let _guard = self.guard();
        let now = self.clock.now_ms();

        if let Some(existing) = self.load_live(utxo_id, now)? {
            if existing.status != ReservationStatus::Succeeded {
                return Err(ReservationError::AlreadyReserved {
                    utxo_id: utxo_id.to_string(),
                    available_at: existing.available_at(self.ttl_ms),
                });
            }
        }

        let entry = ReservationEntry::pending(utxo_id.clone(), attempt_payload, now);
        self.write(&entry)?;
        logging::log_debug(&format!(
            "Reserved UTXO {} until {}",
            utxo_id,
            entry.available_at(self.ttl_ms)
        ));
        Ok(entry)
    }

    /// The UTXO was spent; no further protection is needed
    pub fn mark_success(&self, utxo_id: &UtxoId) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.store.remove(&Self::key(utxo_id))?;
        logging::log_debug(&format!("Released UTXO {} after success", utxo_id));
        Ok(())
    }

    /// The attempt failed. The entry keeps its original timestamp and stays
    /// blocking until the TTL elapses.
    pub fn mark_failed(&self, utxo_id: &UtxoId, reason: &str) -> Result<(), StoreError> {
        let _guard = self.guard();
        let now = self.clock.now_ms();

        let mut entry = self
            .load_live(utxo_id, now)?
            .unwrap_or_else(|| ReservationEntry::pending(utxo_id.clone(), Value::Null, now));
        entry.status = ReservationStatus::Failed;
        entry.failure_reason = Some(reason.to_string());
        self.write(&entry)?;

        logging::log_warning(&format!(
            "UTXO {} marked failed ({}); blocked until {}",
            utxo_id,
            reason,
            entry.available_at(self.ttl_ms)
        ));
        Ok(())
    }

    /// Live entries, oldest first
    pub fn entries(&self) -> Result<Vec<ReservationEntry>, StoreError> {
        let _guard = self.guard();
        let now = self.clock.now_ms();
        let mut live = Vec::new();

        for key in self.store.keys_with_prefix(RESERVATION_KEY_PREFIX)? {
            if let Some(entry) = self.load_live_key(&key, now)? {
                live.push(entry);
            }
        }
        live.sort_by_key(|e| e.created_at);
        Ok(live)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn prune_expired(&self) -> Result<usize, StoreError> {
        let _guard = self.guard();
        let now = self.clock.now_ms();
        let mut removed = 0;

        for key in self.store.keys_with_prefix(RESERVATION_KEY_PREFIX)? {
            if self.load_live_key(&key, now)?.is_none() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Forget every reservation
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.guard();
        for key in self.store.keys_with_prefix(RESERVATION_KEY_PREFIX)? {
            self.store.remove(&key)?;
        }
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(utxo_id: &UtxoId) -> String {
        format!("{}{}", RESERVATION_KEY_PREFIX, utxo_id)
    }

    fn write(&self, entry: &ReservationEntry) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(&Self::key(&entry.utxo_id), &raw)
    }

    fn load_live(&self, utxo_id: &UtxoId, now: i64) -> Result<Option<ReservationEntry>, StoreError> {
        self.load_live_key(&Self::key(utxo_id), now)
    }

    /// Load an entry, removing it if it is expired, settled or unreadable
    fn load_live_key(&self, key: &str, now: i64) -> Result<Option<ReservationEntry>, StoreError> {
        let raw = match self.store.get(key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let entry: ReservationEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                logging::log_warning(&format!("Dropping unreadable reservation {}: {}", key, e));
                self.store.remove(key)?;
                return Ok(None);
            }
        };

        if entry.status == ReservationStatus::Succeeded || entry.is_expired(now, self.ttl_ms) {
            self.store.remove(key)?;
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStore;
    use crate::utils::clock::ManualClock;

    const TTL: i64 = 3_600_000;

    fn cache_at(now: i64) -> (UtxoAvailabilityCache, Arc<ManualClock>, Arc<InMemoryStore>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(InMemoryStore::new());
        let cache = UtxoAvailabilityCache::new(store.clone(), clock.clone(), TTL);
        (cache, clock, store)
    }

    fn id(n: u32) -> UtxoId {
        UtxoId::new("c7f436f44d97a8c67713e9cfecbd0f63222f8c6f1b6dc8af74cac860bf54e907", n)
    }

    #[test]
    fn test_unknown_utxo_is_available() {
        let (cache, _, _) = cache_at(0);
        assert_eq!(cache.check_availability(&id(0)).unwrap(), Availability::Available);
    }

    #[test]
    fn test_reserve_blocks_until_ttl() {
        let (cache, clock, _) = cache_at(1_000);
        cache.reserve(&id(0), serde_json::json!({"op": "open_vault"})).unwrap();

        clock.advance(TTL - 1);
        match cache.check_availability(&id(0)).unwrap() {
            Availability::Reserved { available_at, .. } => assert_eq!(available_at, 1_000 + TTL),
            other => panic!("expected reserved, got {:?}", other),
        }

        clock.advance(1);
        assert!(cache.check_availability(&id(0)).unwrap().is_available());
    }

    #[test]
    fn test_second_reserve_is_rejected() {
        let (cache, _, _) = cache_at(0);
        cache.reserve(&id(0), Value::Null).unwrap();
        let err = cache.reserve(&id(0), Value::Null).unwrap_err();
        assert!(matches!(err, ReservationError::AlreadyReserved { available_at, .. } if available_at == TTL));
    }

    #[test]
    fn test_mark_success_releases() {
        let (cache, _, store) = cache_at(0);
        cache.reserve(&id(0), Value::Null).unwrap();
        cache.mark_success(&id(0)).unwrap();
        assert!(cache.check_availability(&id(0)).unwrap().is_available());
        assert!(store.is_empty());
        assert!(cache.reserve(&id(0), Value::Null).is_ok());
    }

    #[test]
    fn test_mark_failed_reports_burned_and_keeps_timestamp() {
        let (cache, clock, _) = cache_at(5_000);
        cache.reserve(&id(1), Value::Null).unwrap();
        clock.advance(60_000);
        cache.mark_failed(&id(1), "duplicate funding utxo").unwrap();

        let availability = cache.check_availability(&id(1)).unwrap();
        assert_eq!(
            availability,
            Availability::Burned {
                available_at: 5_000 + TTL,
                reason: Some("duplicate funding utxo".to_string()),
            }
        );
        assert!(cache.reserve(&id(1), Value::Null).is_err());

        clock.set(5_000 + TTL);
        assert!(cache.reserve(&id(1), Value::Null).is_ok());
    }

    #[test]
    fn test_mark_failed_without_reservation_still_blocks() {
        let (cache, _, _) = cache_at(10);
        cache.mark_failed(&id(2), "prover timeout").unwrap();
        assert_eq!(cache.check_availability(&id(2)).unwrap().available_at(), Some(10 + TTL));
    }

    #[test]
    fn test_entries_and_prune() {
        let (cache, clock, _) = cache_at(0);
        cache.reserve(&id(0), Value::Null).unwrap();
        clock.advance(1_000);
        cache.reserve(&id(1), Value::Null).unwrap();

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].utxo_id, id(0));

        clock.set(TTL + 500);
        assert_eq!(cache.prune_expired().unwrap(), 1);
        assert_eq!(cache.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let (cache, _, store) = cache_at(0);
        cache.reserve(&id(0), Value::Null).unwrap();
        cache.mark_failed(&id(1), "x").unwrap();
        store.set("unrelated", "keep").unwrap();
        cache.clear().unwrap();
        assert!(cache.entries().unwrap().is_empty());
        assert_eq!(store.get("unrelated").unwrap(), Some("keep".to_string()));
    }

    #[test]
    fn test_unreadable_entry_is_dropped() {
        let (cache, _, store) = cache_at(0);
        store
            .set(&format!("{}{}", RESERVATION_KEY_PREFIX, id(3)), "{broken")
            .unwrap();
        assert!(cache.check_availability(&id(3)).unwrap().is_available());
        assert!(store.is_empty());
    }

    #[test]
    fn test_retention_mismatch_detected() {
        let (cache, _, _) = cache_at(0);
        assert!(cache.warn_on_retention_mismatch(TTL));
        assert!(!cache.warn_on_retention_mismatch(TTL * 2));
    }
}

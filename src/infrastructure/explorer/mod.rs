//! Blockchain explorer collaborators
//!
//! Standardized interfaces for reading a wallet's UTXO set and relaying raw
//! transactions, plus the Esplora-style REST implementation.

pub mod client;
mod error;

pub use client::ExplorerClient;
pub use error::ExplorerClientError;

use async_trait::async_trait;

use crate::domain::models::UtxoRecord;

/// Source of a wallet's unspent outputs
#[async_trait]
pub trait UtxoSource: Send + Sync {
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<UtxoRecord>, ExplorerClientError>;
}

/// Relays a signed raw transaction and returns its txid
#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ExplorerClientError>;
}

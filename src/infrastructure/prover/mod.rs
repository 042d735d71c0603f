//! Charms prover collaborator

pub mod client;
mod error;

pub use client::{ProveRequest, ProverClient};
pub use error::ProverClientError;

use async_trait::async_trait;

use crate::domain::models::TransactionPair;

/// Turns a spell plus funding UTXO into commit and spell transactions.
///
/// Calls take seconds to minutes and cannot be cancelled once sent; callers
/// must reserve the funding UTXOs before invoking `prove`.
#[async_trait]
pub trait SpellProver: Send + Sync {
    async fn prove(&self, request: &ProveRequest) -> Result<TransactionPair, ProverClientError>;
}

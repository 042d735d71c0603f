//! UTXO reservation, selection and operation sequencing for zkUSD vault
//! spells.
//!
//! A UTXO handed to the Charms prover stays in the prover's attempt cache for
//! an hour whatever the outcome. The [`UtxoAvailabilityCache`] mirrors that
//! locally so the [`UtxoSelector`] never offers the same output to two
//! attempts, and the operation machine in
//! [`domain::services::operation_machine`] sequences each attempt from
//! selection to broadcast.
//!
//! The cache is local to one store. Two processes or devices sharing a wallet
//! can still race the same UTXO.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod utils;

pub use config::AppConfig;
pub use domain::errors::ErrorType;
pub use domain::services::{parse_error_type, UtxoAvailabilityCache, UtxoSelector};

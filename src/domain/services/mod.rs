pub mod availability_cache;
pub mod error_classifier;
pub mod operation_machine;
pub mod utxo_selector;

pub use availability_cache::UtxoAvailabilityCache;
pub use error_classifier::parse_error_type;
pub use utxo_selector::{
    AvailabilityView, ReservedUtxo, SelectionStatus, UtxoPairResult, UtxoSelectResult,
    UtxoSelector,
};

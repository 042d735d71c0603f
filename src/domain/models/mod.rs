pub mod operation;
pub mod reservation;
pub mod utxo;

pub use operation::{
    OperationRequest, OperationResult, SelectedUtxos, SpellContext, TransactionPair,
    VaultOperation, VaultState, DUST_LIMIT_SATS,
};
pub use reservation::{Availability, ReservationEntry, ReservationStatus};
pub use utxo::{UtxoId, UtxoRecord};

pub mod operation_runner;
pub mod retry_handler;
pub mod simulation;

pub use operation_runner::{
    CollaboratorError, ContextObserver, RunnerSetupError, SpellBuilder, TransactionSigner,
    VaultOperationRunner,
};
pub use retry_handler::{RetryHandler, RetryingUtxoSource};
pub use simulation::{FailurePoint, SimulationDriver, SimulationError, SimulationProgress};

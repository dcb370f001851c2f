//! Public interface of the ledger pre-execution engine: configuration,
//! errors, shared types, the controller traits implemented by the worker
//! crate, and the collaborator contracts the worker consumes.

mod config;
mod controller_traits;
mod error;
mod host_traits;
mod interface_traits;
mod types;

pub use config::PreExecutionConfig;
pub use controller_traits::{PreExecutionController, PreExecutionManager};
pub use error::PreExecutionError;
pub use host_traits::ContractHost;
pub use interface_traits::{ContractRuntime, LedgerStore, TransactionApplier};
pub use types::{
    AppliedTransaction, ClosingLedger, ContractLog, ContractParameter, ContractTestParameter,
    PreProcessCallback, PreProcessStatus, RegistryStatus, SyntheticEnvironment, TestCallMode,
    TestProcessOutput,
};

#[cfg(feature = "testing")]
pub mod test_exports;

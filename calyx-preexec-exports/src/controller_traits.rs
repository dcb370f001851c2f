use crate::error::PreExecutionError;
use crate::types::{
    ClosingLedger, ContractTestParameter, PreProcessCallback, PreProcessStatus, RegistryStatus,
    TestProcessOutput,
};
use calyx_models::account::ContractType;
use calyx_models::consensus_value::ConsensusValue;
use calyx_time::CalyxTime;

/// Entry points of the pre-execution engine.
pub trait PreExecutionController: Send + Sync {
    /// Synchronously produce the closing ledger for a consensus value; used
    /// on the commit path.
    ///
    /// Returns the cached closing ledger when an identical pre-execution
    /// already completed, otherwise runs the job inline on the calling
    /// thread. Inline runs are never enlisted in the registry. The closing
    /// ledger is returned even when the apply failed; callers inspect the
    /// per-transaction results.
    fn sync_process(
        &self,
        consensus_value: &ConsensusValue,
    ) -> Result<ClosingLedger, PreExecutionError>;

    /// Start a fire-and-forget pre-execution.
    ///
    /// On a positive cache probe, returns `CachedSuccess` without invoking
    /// the callback (the caller already knows the outcome). Otherwise the
    /// job is enlisted and a worker spawned; the callback fires exactly once
    /// with the terminal outcome. On spawn failure the job is removed from
    /// the registry and discarded.
    fn async_pre_process(
        &self,
        consensus_value: &ConsensusValue,
        callback: PreProcessCallback,
    ) -> Result<PreProcessStatus, PreExecutionError>;

    /// Pre-execute and wait for completion under a wall-clock bound.
    ///
    /// Polls the job at the configured cadence. `Ok(())` when the job
    /// terminated in time (or an identical pre-execution already completed
    /// successfully); `Err(Timeout(timeout_tx_index))` when the budget
    /// expired, after the job was cancelled.
    fn sync_pre_process(
        &self,
        consensus_value: &ConsensusValue,
        total_timeout: CalyxTime,
    ) -> Result<(), PreExecutionError>;

    /// Run a contract test or query against a synthetic environment and wait
    /// for its outputs under a wall-clock bound.
    fn sync_test_process(
        &self,
        contract_type: ContractType,
        parameter: ContractTestParameter,
        total_timeout: CalyxTime,
    ) -> Result<TestProcessOutput, PreExecutionError>;

    /// Prune every completed job whose consensus value closed a ledger with
    /// sequence lower than or equal to `ledger_seq`; called on commit.
    fn remove_completed(&self, ledger_seq: u64);

    /// Registry occupancy
    fn status(&self) -> RegistryStatus;

    /// Returns a boxed clone of self.
    /// Allows cloning `Box<dyn PreExecutionController>`.
    fn clone_box(&self) -> Box<dyn PreExecutionController>;
}

impl Clone for Box<dyn PreExecutionController> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Pre-execution manager.
/// Allows stopping the engine.
pub trait PreExecutionManager {
    /// Stops the expiry sweeper and waits for it to exit.
    /// Running jobs are left to their callers' timeouts.
    fn stop(&mut self);
}

//! This module implements the pre-execution controller: the four entry
//! points composing fingerprinting, the job registry and the per-job worker
//! threads. See `calyx-preexec-exports/controller_traits.rs` for the
//! functional contract.

use crate::context::PreExecutionContext;
use crate::registry::ContextRegistry;
use calyx_models::account::ContractType;
use calyx_models::consensus_value::ConsensusValue;
use calyx_preexec_exports::{
    ClosingLedger, ContractRuntime, ContractTestParameter, LedgerStore, PreExecutionConfig,
    PreExecutionController, PreExecutionError, PreExecutionManager, PreProcessCallback,
    PreProcessStatus, RegistryStatus, TestProcessOutput, TransactionApplier,
};
use calyx_time::CalyxTime;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// implementation of the pre-execution controller
#[derive(Clone)]
pub struct PreExecutionControllerImpl {
    /// engine configuration
    pub(crate) config: PreExecutionConfig,
    /// shared job registry
    pub(crate) registry: Arc<ContextRegistry>,
    /// external transaction applier
    pub(crate) applier: Arc<dyn TransactionApplier>,
    /// external contract interpreter
    pub(crate) runtime: Arc<dyn ContractRuntime>,
    /// read-only closed-ledger state
    pub(crate) store: Arc<dyn LedgerStore>,
}

impl PreExecutionControllerImpl {
    /// Polls the job until it terminates or `total_timeout` elapses.
    ///
    /// # Returns
    /// `true` when the job terminated in time.
    fn wait_for_completion(&self, ctx: &Arc<PreExecutionContext>, total_timeout: CalyxTime) -> bool {
        let started = Instant::now();
        while ctx.is_running() {
            std::thread::sleep(self.config.poll_interval.to_duration());
            if started.elapsed() > total_timeout.to_duration() {
                return false;
            }
        }
        true
    }
}

impl PreExecutionController for PreExecutionControllerImpl {
    fn sync_process(
        &self,
        consensus_value: &ConsensusValue,
    ) -> Result<ClosingLedger, PreExecutionError> {
        let fingerprint = consensus_value.compute_fingerprint()?;
        if let Some(ledger) = self.registry.completed_ledger(&fingerprint) {
            return Ok(ledger);
        }

        info!(
            "synchronously processing the consensus value, ledger seq {}",
            consensus_value.ledger_seq
        );
        // commit path: run inline on the calling thread with the
        // per-transaction budget disabled; never enlisted in the registry
        let ctx = Arc::new(PreExecutionContext::new_apply(
            fingerprint,
            consensus_value.clone(),
            None,
            None,
            true,
            std::sync::Weak::new(),
            self.applier.clone(),
            self.runtime.clone(),
            self.store.clone(),
        ));
        ctx.run();
        Ok(ctx.closing_ledger())
    }

    fn async_pre_process(
        &self,
        consensus_value: &ConsensusValue,
        callback: PreProcessCallback,
    ) -> Result<PreProcessStatus, PreExecutionError> {
        let fingerprint = consensus_value.compute_fingerprint()?;
        // only a cached success short-circuits: a cached failure is
        // re-executed, fire-and-forget duplicates are allowed
        if let Some(true) = self.registry.check_complete(&fingerprint) {
            return Ok(PreProcessStatus::CachedSuccess);
        }

        let ctx = Arc::new(PreExecutionContext::new_apply(
            fingerprint,
            consensus_value.clone(),
            Some(self.config.tx_timeout),
            Some(callback),
            false,
            Arc::downgrade(&self.registry),
            self.applier.clone(),
            self.runtime.clone(),
            self.store.clone(),
        ));
        self.registry.enlist_running(fingerprint, ctx.clone());

        if let Err(err) = PreExecutionContext::start(&ctx, "process-value") {
            warn!(
                "could not start the pre-execution worker for {}: {}",
                fingerprint, err
            );
            self.registry.discard_running(&ctx);
            return Ok(PreProcessStatus::StartFailed);
        }
        Ok(PreProcessStatus::Running)
    }

    fn sync_pre_process(
        &self,
        consensus_value: &ConsensusValue,
        total_timeout: CalyxTime,
    ) -> Result<(), PreExecutionError> {
        let fingerprint = consensus_value.compute_fingerprint()?;
        match self.registry.check_complete(&fingerprint) {
            Some(true) => return Ok(()),
            Some(false) => return Err(PreExecutionError::CachedFailure),
            None => {}
        }

        let ctx = Arc::new(PreExecutionContext::new_apply(
            fingerprint,
            consensus_value.clone(),
            Some(self.config.tx_timeout),
            None,
            false,
            Arc::downgrade(&self.registry),
            self.applier.clone(),
            self.runtime.clone(),
            self.store.clone(),
        ));
        // enlisted like any other running job so the sweeper's global budget
        // also covers synchronous callers
        self.registry.enlist_running(fingerprint, ctx.clone());

        if let Err(err) = PreExecutionContext::start(&ctx, "process-value") {
            warn!(
                "could not start the pre-execution worker for {}: {}",
                fingerprint, err
            );
            self.registry.discard_running(&ctx);
            return Err(err);
        }

        if !self.wait_for_completion(&ctx, total_timeout) {
            ctx.cancel();
            let timeout_tx_index = ctx.timeout_tx_index();
            warn!(
                "pre-execution of ledger seq {} ran past its {} ms budget, timeout tx index {}",
                consensus_value.ledger_seq,
                total_timeout.to_millis(),
                timeout_tx_index
            );
            return Err(PreExecutionError::Timeout(timeout_tx_index));
        }
        Ok(())
    }

    fn sync_test_process(
        &self,
        contract_type: ContractType,
        parameter: ContractTestParameter,
        total_timeout: CalyxTime,
    ) -> Result<TestProcessOutput, PreExecutionError> {
        let ctx = Arc::new(PreExecutionContext::new_test(
            contract_type,
            parameter,
            self.applier.clone(),
            self.runtime.clone(),
            self.store.clone(),
        ));

        if let Err(err) = PreExecutionContext::start(&ctx, "test-contract") {
            warn!("could not start the contract test worker: {}", err);
            return Err(err);
        }

        if !self.wait_for_completion(&ctx, total_timeout) {
            ctx.cancel();
            warn!(
                "contract test ran past its {} ms budget",
                total_timeout.to_millis()
            );
            return Err(PreExecutionError::Timeout(ctx.timeout_tx_index()));
        }

        let ledger = ctx.closing_ledger();
        let mut txs = Vec::new();
        if let Some(header) = &ledger.header {
            for applied in &ledger.applied {
                for receipt in &applied.instructions {
                    let mut receipt = receipt.clone();
                    receipt.ledger_seq = header.seq;
                    receipt.close_time = header.close_time;
                    txs.push(receipt);
                }
            }
        }
        Ok(TestProcessOutput {
            logs: ctx.logs(),
            txs,
            returns: ctx.returns(),
        })
    }

    fn remove_completed(&self, ledger_seq: u64) {
        self.registry.remove_completed(ledger_seq);
    }

    fn status(&self) -> RegistryStatus {
        self.registry.status()
    }

    fn clone_box(&self) -> Box<dyn PreExecutionController> {
        Box::new(self.clone())
    }
}

/// Pre-execution manager.
/// Allows stopping the expiry sweeper.
pub struct PreExecutionManagerImpl {
    /// stop flag shared with the sweeper thread, with its wakeup condvar
    pub(crate) stop_flag: Arc<(Mutex<bool>, Condvar)>,
    /// handle used to join the sweeper thread
    pub(crate) thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl PreExecutionManager for PreExecutionManagerImpl {
    /// stops the sweeper
    fn stop(&mut self) {
        info!("stopping pre-execution sweeper...");
        {
            let (stop_lock, condvar) = &*self.stop_flag;
            let mut stopped = stop_lock.lock();
            *stopped = true;
            condvar.notify_one();
        }
        if let Some(join_handle) = self.thread_handle.take() {
            join_handle
                .join()
                .expect("pre-execution sweeper thread panicked");
        }
        info!("pre-execution sweeper stopped");
    }
}

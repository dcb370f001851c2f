//! The expiry sweeper: a periodic task cancelling running jobs that exceeded
//! the global wall-clock budget, whoever started them.

use crate::controller::{PreExecutionControllerImpl, PreExecutionManagerImpl};
use crate::registry::ContextRegistry;
use calyx_preexec_exports::{
    ContractRuntime, LedgerStore, PreExecutionConfig, PreExecutionController,
    PreExecutionManager, TransactionApplier,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::warn;

/// structure gathering all elements needed by the sweeper thread
pub(crate) struct SweeperThread {
    /// engine configuration
    config: PreExecutionConfig,
    /// shared job registry
    registry: Arc<ContextRegistry>,
    /// stop flag raised by the manager, with its wakeup condvar
    stop_flag: Arc<(Mutex<bool>, Condvar)>,
}

impl SweeperThread {
    /// main sweeper loop: one tick per `sweeper_interval`.
    ///
    /// Each tick snapshots the expired jobs under the registry lock and
    /// cancels them outside of it; cancellation joins worker threads and must
    /// never run under the lock.
    pub fn main_loop(&self) {
        let (stop_lock, condvar) = &*self.stop_flag;
        loop {
            {
                let mut stopped = stop_lock.lock();
                if *stopped {
                    break;
                }
                let _ = condvar.wait_for(&mut stopped, self.config.sweeper_interval.to_duration());
                if *stopped {
                    break;
                }
            }

            let expired = self.registry.snapshot_expired(self.config.global_budget);
            for ctx in expired {
                warn!(
                    "cancelling pre-execution job over the {} ms global budget",
                    self.config.global_budget.to_millis()
                );
                ctx.cancel();
            }
        }
    }
}

/// launches the pre-execution engine and returns its manager and controller
///
/// # parameters
/// * `config`: engine configuration
/// * `applier`: external transaction applier
/// * `runtime`: external contract interpreter
/// * `store`: read-only closed-ledger state
pub fn start_preexec_worker(
    config: PreExecutionConfig,
    applier: Arc<dyn TransactionApplier>,
    runtime: Arc<dyn ContractRuntime>,
    store: Arc<dyn LedgerStore>,
) -> (Box<dyn PreExecutionManager>, Box<dyn PreExecutionController>) {
    let registry = Arc::new(ContextRegistry::new());

    // create a controller
    let controller = PreExecutionControllerImpl {
        config: config.clone(),
        registry: registry.clone(),
        applier,
        runtime,
        store,
    };

    // launch the sweeper thread
    let stop_flag = Arc::new((Mutex::new(false), Condvar::new()));
    let sweeper = SweeperThread {
        config,
        registry,
        stop_flag: stop_flag.clone(),
    };
    let thread_handle = std::thread::Builder::new()
        .name("preexec-sweeper".to_string())
        .spawn(move || sweeper.main_loop())
        .expect("could not spawn the pre-execution sweeper thread");

    (
        Box::new(PreExecutionManagerImpl {
            stop_flag,
            thread_handle: Some(thread_handle),
        }),
        Box::new(controller),
    )
}

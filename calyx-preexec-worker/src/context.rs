//! This module implements the per-job execution context: one speculative
//! application of a consensus value, or one contract test/query. The context
//! owns the closing-ledger builder, accumulates contract logs and returns,
//! tracks the stack of active contract invocations, and carries the
//! cooperative-cancellation protocol.

use calyx_hash::Hash;
use calyx_models::account::{Account, ContractType};
use calyx_models::address::Address;
use calyx_models::consensus_value::ConsensusValue;
use calyx_models::ledger::LedgerHeader;
use calyx_models::transaction::{Operation, Transaction};
use calyx_preexec_exports::{
    AppliedTransaction, ClosingLedger, ContractHost, ContractLog, ContractParameter,
    ContractRuntime, ContractTestParameter, LedgerStore, PreExecutionError, PreProcessCallback,
    SyntheticEnvironment, TestCallMode, TransactionApplier,
};
use calyx_signature::KeyPair;
use calyx_time::CalyxTime;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::ContextRegistry;

/// What a context executes
pub(crate) enum ExecutionKind {
    /// speculative application of a real consensus value
    ApplyReal {
        /// hash of the consensus value's canonical wire form; the registry key
        fingerprint: Hash,
        /// completion callback of asynchronous jobs, fired exactly once
        callback: Mutex<Option<PreProcessCallback>>,
        /// synchronous jobs are polled by their caller and fire no callback
        sync: bool,
    },
    /// contract test or query against a synthetic environment
    ContractRun {
        contract_type: ContractType,
        parameter: Mutex<ContractTestParameter>,
    },
}

/// One speculative execution.
///
/// The worker thread running `run()` is the only mutator of the closing
/// ledger, the accumulators and the terminal flags. `contract_ids` is also
/// touched by cancelling callers, under its own mutex. The registry only ever
/// moves the context between its maps.
pub(crate) struct PreExecutionContext {
    kind: ExecutionKind,
    /// consensus value being executed; test jobs build a synthetic one on start
    consensus_value: Mutex<Option<ConsensusValue>>,
    /// per-transaction budget handed to the applier; `None` on the commit path
    tx_timeout: Option<CalyxTime>,
    /// set when the worker picks the job up; expiry is measured from here
    start_time: Mutex<Option<Instant>>,
    /// index of the first transaction that exceeded `tx_timeout`, or -1
    timeout_tx_index: AtomicI32,
    closing_ledger: Mutex<ClosingLedger>,
    logs: Mutex<Vec<ContractLog>>,
    returns: Mutex<Vec<serde_json::Value>>,
    /// LIFO of active contract invocation ids
    contract_ids: Mutex<Vec<i64>>,
    /// LIFO of the transactions currently being applied
    transaction_stack: Mutex<Vec<Transaction>>,
    /// terminal outcome, valid once `running` has cleared
    exe_result: AtomicBool,
    running: AtomicBool,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    /// non-owning back-reference used to request move-to-completed
    registry: Weak<ContextRegistry>,
    applier: Arc<dyn TransactionApplier>,
    runtime: Arc<dyn ContractRuntime>,
    store: Arc<dyn LedgerStore>,
}

impl PreExecutionContext {
    /// Creates a context applying a real consensus value
    #[allow(clippy::too_many_arguments)]
    pub fn new_apply(
        fingerprint: Hash,
        consensus_value: ConsensusValue,
        tx_timeout: Option<CalyxTime>,
        callback: Option<PreProcessCallback>,
        sync: bool,
        registry: Weak<ContextRegistry>,
        applier: Arc<dyn TransactionApplier>,
        runtime: Arc<dyn ContractRuntime>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        PreExecutionContext {
            kind: ExecutionKind::ApplyReal {
                fingerprint,
                callback: Mutex::new(callback),
                sync,
            },
            consensus_value: Mutex::new(Some(consensus_value)),
            tx_timeout,
            start_time: Mutex::new(None),
            timeout_tx_index: AtomicI32::new(-1),
            closing_ledger: Mutex::new(ClosingLedger::default()),
            logs: Mutex::new(Vec::new()),
            returns: Mutex::new(Vec::new()),
            contract_ids: Mutex::new(Vec::new()),
            transaction_stack: Mutex::new(Vec::new()),
            exe_result: AtomicBool::new(false),
            running: AtomicBool::new(false),
            worker_handle: Mutex::new(None),
            registry,
            applier,
            runtime,
            store,
        }
    }

    /// Creates a context running a contract test or query
    pub fn new_test(
        contract_type: ContractType,
        parameter: ContractTestParameter,
        applier: Arc<dyn TransactionApplier>,
        runtime: Arc<dyn ContractRuntime>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        PreExecutionContext {
            kind: ExecutionKind::ContractRun {
                contract_type,
                parameter: Mutex::new(parameter),
            },
            consensus_value: Mutex::new(None),
            tx_timeout: None,
            start_time: Mutex::new(None),
            timeout_tx_index: AtomicI32::new(-1),
            closing_ledger: Mutex::new(ClosingLedger::default()),
            logs: Mutex::new(Vec::new()),
            returns: Mutex::new(Vec::new()),
            contract_ids: Mutex::new(Vec::new()),
            transaction_stack: Mutex::new(Vec::new()),
            exe_result: AtomicBool::new(false),
            running: AtomicBool::new(false),
            worker_handle: Mutex::new(None),
            registry: Weak::new(),
            applier,
            runtime,
            store,
        }
    }

    /// Spawns a named worker thread running the given context.
    ///
    /// The `running` flag is raised before spawning so that pollers started
    /// right after never observe a not-yet-running job as terminated.
    pub fn start(ctx: &Arc<Self>, thread_name: &str) -> Result<(), PreExecutionError> {
        let worker_ctx = ctx.clone();
        ctx.running.store(true, Ordering::SeqCst);
        match std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker_ctx.run())
        {
            Ok(handle) => {
                *ctx.worker_handle.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                ctx.running.store(false, Ordering::SeqCst);
                Err(PreExecutionError::StartFailed(err.to_string()))
            }
        }
    }

    /// Executes the job on the calling thread; the worker-thread body.
    pub fn run(&self) {
        *self.start_time.lock() = Some(Instant::now());
        match &self.kind {
            ExecutionKind::ApplyReal { .. } => self.do_apply(),
            ExecutionKind::ContractRun { .. } => {
                let result = self.do_test();
                self.exe_result.store(result, Ordering::SeqCst);
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Applies the consensus value to the closing ledger.
    fn do_apply(&self) {
        let (fingerprint, sync) = match &self.kind {
            ExecutionKind::ApplyReal {
                fingerprint, sync, ..
            } => (*fingerprint, *sync),
            ExecutionKind::ContractRun { .. } => return,
        };
        let consensus_value = match self.consensus_value.lock().clone() {
            Some(consensus_value) => consensus_value,
            None => return,
        };
        info!(
            "processing the consensus value, ledger seq {}",
            consensus_value.ledger_seq
        );

        let last_closed = self.store.last_closed_header();
        let exe_result = {
            let mut ledger = self.closing_ledger.lock();
            ledger.header = Some(LedgerHeader {
                seq: consensus_value.ledger_seq,
                close_time: consensus_value.close_time,
                previous_hash: consensus_value.previous_ledger_hash,
                consensus_value_hash: fingerprint,
                version: last_closed.version,
            });
            ledger.consensus_value = Some(consensus_value.clone());

            let mut timeout_tx_index = -1;
            let exe_result = self.applier.apply(
                &consensus_value,
                &mut ledger,
                self,
                self.tx_timeout,
                &mut timeout_tx_index,
            );
            self.timeout_tx_index
                .store(timeout_tx_index, Ordering::SeqCst);
            exe_result
        };
        self.exe_result.store(exe_result, Ordering::SeqCst);

        if !sync {
            if let ExecutionKind::ApplyReal { callback, .. } = &self.kind {
                if let Some(callback) = callback.lock().take() {
                    callback(exe_result);
                }
            }
        }
        // move running to complete
        if let Some(registry) = self.registry.upgrade() {
            registry.move_running_to_complete(self);
        }
    }

    /// Runs a contract test or query against a fresh synthetic environment.
    fn do_test(&self) -> bool {
        let (contract_type, mut parameter) = match &self.kind {
            ExecutionKind::ContractRun {
                contract_type,
                parameter,
            } => (*contract_type, parameter.lock().clone()),
            ExecutionKind::ApplyReal { .. } => return false,
        };

        // if the contract address is absent, install a temporary account
        // carrying the code under test at a freshly derived address
        let mut environment = SyntheticEnvironment::new();
        let contract_address = match parameter.contract_address {
            Some(address) => address,
            None => {
                let keypair = KeyPair::generate();
                let address = Address::from_public_key(&keypair.get_public_key());
                let account =
                    Account::with_contract(address, contract_type, parameter.code.clone());
                if let Err(err) = environment.add_entry(account) {
                    warn!("could not install synthetic contract account: {}", err);
                    return false;
                }
                parameter.contract_address = Some(address);
                address
            }
        };

        // a source unknown to the store gets a bare synthetic account; an
        // invalid one is replaced by a fresh address first
        let source_address = match Address::from_str(&parameter.source_address) {
            Ok(address) if self.store.account_from_db(&address).is_some() => address,
            parsed => {
                let address = match parsed {
                    Ok(address) => address,
                    Err(_) => Address::from_public_key(&KeyPair::generate().get_public_key()),
                };
                if let Err(err) = environment.add_entry(Account::new(address)) {
                    warn!("could not install synthetic source account: {}", err);
                    return false;
                }
                parameter.source_address = address.to_string();
                address
            }
        };

        // the synthetic value closes the ledger right after the last closed one
        let last_closed = self.store.last_closed_header();
        let consensus_value = ConsensusValue {
            ledger_seq: last_closed.seq + 1,
            close_time: last_closed.close_time.saturating_add(CalyxTime::EPSILON),
            previous_ledger_hash: last_closed.consensus_value_hash,
            transactions: Vec::new(),
        };
        let consensus_value_hash = match consensus_value.compute_fingerprint() {
            Ok(hash) => hash,
            Err(err) => {
                warn!("could not fingerprint the synthetic consensus value: {}", err);
                return false;
            }
        };
        let header = LedgerHeader {
            seq: consensus_value.ledger_seq,
            close_time: consensus_value.close_time,
            previous_hash: consensus_value.previous_ledger_hash,
            consensus_value_hash,
            version: last_closed.version,
        };
        *self.consensus_value.lock() = Some(consensus_value.clone());
        if let ExecutionKind::ContractRun {
            parameter: stored, ..
        } = &self.kind
        {
            *stored.lock() = parameter.clone();
        }

        match parameter.call_mode {
            TestCallMode::Execute => {
                // synthesize the trigger transaction: a payment from the
                // source to the contract carrying the input payload
                let transaction = Transaction {
                    source_address,
                    operations: vec![Operation::Payment {
                        dest_address: contract_address,
                        input: parameter.input.clone(),
                    }],
                };
                self.transaction_stack.lock().push(transaction.clone());
                let mut ledger = self.closing_ledger.lock();
                ledger.header = Some(header);
                ledger.consensus_value = Some(consensus_value);
                let mut applied = AppliedTransaction::new(transaction.clone());
                applied.environment = Some(environment);
                ledger.applied.push(applied);
                self.applier.do_transaction(&transaction, &mut ledger, self)
            }
            TestCallMode::Query => {
                let serialized_value = match serde_json::to_string(&consensus_value) {
                    Ok(serialized) => serialized,
                    Err(err) => {
                        warn!("could not serialize the synthetic consensus value: {}", err);
                        return false;
                    }
                };
                let query_parameter = ContractParameter {
                    code: parameter.code.clone(),
                    sender: source_address,
                    this_address: contract_address,
                    input: parameter.input.clone(),
                    ope_index: 0,
                    trigger_tx: "{}".to_string(),
                    consensus_value: serialized_value,
                };
                let mut query_result = serde_json::Value::Null;
                self.runtime
                    .query(contract_type, &query_parameter, self, &mut query_result)
            }
        }
    }

    /// Cancels the job: asks the interpreter to abort every stacked contract
    /// invocation, innermost first, then waits for the worker to exit.
    ///
    /// Idempotent. The snapshot is taken under the stack's mutex and the
    /// interpreter is signalled outside of it, as `cancel` may re-enter the
    /// host callbacks of this same context.
    pub fn cancel(&self) {
        let snapshot: Vec<i64> = self.contract_ids.lock().clone();
        for invocation_id in snapshot.into_iter().rev() {
            debug!("cancelling contract invocation {}", invocation_id);
            self.runtime.cancel(invocation_id);
        }
        self.join_worker();
    }

    /// Whether the wall clock ran past `budget` since the worker picked the
    /// job up. Jobs not yet picked up are never expired.
    pub fn check_expired(&self, budget: CalyxTime) -> bool {
        match *self.start_time.lock() {
            Some(start_time) => start_time.elapsed() >= budget.to_duration(),
            None => false,
        }
    }

    /// Whether the worker is still executing the job
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Fingerprint of the consensus value, for registry-keyed jobs
    pub fn fingerprint(&self) -> Option<Hash> {
        match &self.kind {
            ExecutionKind::ApplyReal { fingerprint, .. } => Some(*fingerprint),
            ExecutionKind::ContractRun { .. } => None,
        }
    }

    /// Sequence of the ledger the consensus value would close
    pub fn ledger_seq(&self) -> Option<u64> {
        self.consensus_value
            .lock()
            .as_ref()
            .map(|consensus_value| consensus_value.ledger_seq)
    }

    /// Terminal outcome; meaningful only once the job stopped running
    pub fn exe_result(&self) -> bool {
        self.exe_result.load(Ordering::SeqCst)
    }

    /// Index of the first transaction that exceeded the per-transaction
    /// budget, or -1
    pub fn timeout_tx_index(&self) -> i32 {
        self.timeout_tx_index.load(Ordering::SeqCst)
    }

    /// Copy of the closing ledger; callers read it only after the job is
    /// terminal
    pub fn closing_ledger(&self) -> ClosingLedger {
        self.closing_ledger.lock().clone()
    }

    /// Accumulated contract logs, in append order
    pub fn logs(&self) -> Vec<ContractLog> {
        self.logs.lock().clone()
    }

    /// Accumulated contract returns, in append order
    pub fn returns(&self) -> Vec<serde_json::Value> {
        self.returns.lock().clone()
    }

    fn join_worker(&self) {
        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("pre-execution worker thread panicked");
            }
        }
    }
}

impl ContractHost for PreExecutionContext {
    fn push_log(&self, address: &Address, lines: Vec<String>) {
        self.logs.lock().push(ContractLog {
            address: *address,
            lines,
        });
    }

    fn push_return(&self, _address: &Address, value: serde_json::Value) {
        self.returns.lock().push(value);
    }

    fn push_contract_id(&self, invocation_id: i64) {
        self.contract_ids.lock().push(invocation_id);
    }

    fn pop_contract_id(&self) {
        self.contract_ids.lock().pop();
    }

    fn top_contract_id(&self) -> Option<i64> {
        self.contract_ids.lock().last().copied()
    }

    fn current_transaction(&self) -> Option<Transaction> {
        self.transaction_stack.lock().last().cloned()
    }
}

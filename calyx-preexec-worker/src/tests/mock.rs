//! Configurable stubs for the engine's external collaborators: a scriptable
//! applier, a contract runtime with a cancellation log, and an in-memory
//! ledger store.

use calyx_hash::Hash;
use calyx_models::account::Account;
use calyx_models::address::Address;
use calyx_models::consensus_value::ConsensusValue;
use calyx_models::ledger::{ExecResult, LedgerHeader};
use calyx_models::transaction::{Operation, Transaction, TransactionReceipt};
use calyx_preexec_exports::{
    AppliedTransaction, ClosingLedger, ContractHost, ContractParameter, ContractRuntime,
    LedgerStore, SyntheticEnvironment, TransactionApplier,
};
use calyx_signature::KeyPair;
use calyx_time::CalyxTime;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SPIN_SLICE: Duration = Duration::from_millis(2);

/// Behavior of the applier on one chosen transaction: stack the given
/// contract invocation ids, then hold until cancellation reaches them.
#[derive(Clone)]
pub struct StallScript {
    pub tx_index: usize,
    pub contract_ids: Vec<i64>,
}

/// Behavior of `do_transaction` on the contract-test path.
#[derive(Clone)]
pub struct TestScript {
    /// invocation ids pushed in order, simulating nested sub-contract calls
    pub nested_ids: Vec<i64>,
    /// hold inside the innermost invocation until cancelled
    pub block: bool,
}

/// Scriptable stand-in for the external transaction applier.
pub struct MockApplier {
    /// number of `apply` invocations; doubles as a worker-spawn counter since
    /// every worker runs exactly one apply
    pub apply_calls: AtomicUsize,
    /// finite sleeps injected before given transaction indices
    pub tx_sleeps: Mutex<HashMap<usize, Duration>>,
    /// when set, the chosen transaction stalls until cancelled
    pub stall: Mutex<Option<StallScript>>,
    /// scripted behavior of the contract-test path
    pub test_script: Mutex<Option<TestScript>>,
    /// make `apply` report failure even when every transaction went through
    pub fail: AtomicBool,
    /// synthetic environment observed by the last `do_transaction`
    pub seen_environment: Mutex<Option<SyntheticEnvironment>>,
    cancelled: Arc<AtomicBool>,
}

impl MockApplier {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        MockApplier {
            apply_calls: AtomicUsize::new(0),
            tx_sleeps: Mutex::new(HashMap::new()),
            stall: Mutex::new(None),
            test_script: Mutex::new(None),
            fail: AtomicBool::new(false),
            seen_environment: Mutex::new(None),
            cancelled,
        }
    }
}

impl TransactionApplier for MockApplier {
    fn apply(
        &self,
        consensus_value: &ConsensusValue,
        ledger: &mut ClosingLedger,
        host: &dyn ContractHost,
        tx_timeout: Option<CalyxTime>,
        timeout_tx_index: &mut i32,
    ) -> bool {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        for (index, transaction) in consensus_value.transactions.iter().enumerate() {
            let started = Instant::now();

            let stall = self.stall.lock().clone();
            if let Some(script) = stall.filter(|script| script.tx_index == index) {
                for invocation_id in &script.contract_ids {
                    host.push_contract_id(*invocation_id);
                }
                loop {
                    if let Some(budget) = tx_timeout {
                        if started.elapsed() >= budget.to_duration() && *timeout_tx_index < 0 {
                            *timeout_tx_index = index as i32;
                        }
                    }
                    if self.cancelled.load(Ordering::SeqCst) {
                        if *timeout_tx_index < 0 {
                            *timeout_tx_index = index as i32;
                        }
                        return false;
                    }
                    std::thread::sleep(SPIN_SLICE);
                }
            }

            let tx_sleep = self.tx_sleeps.lock().get(&index).copied();
            if let Some(tx_sleep) = tx_sleep {
                while started.elapsed() < tx_sleep {
                    if self.cancelled.load(Ordering::SeqCst) {
                        *timeout_tx_index = index as i32;
                        return false;
                    }
                    std::thread::sleep(SPIN_SLICE);
                }
            }

            if let Some(budget) = tx_timeout {
                if started.elapsed() >= budget.to_duration() {
                    *timeout_tx_index = index as i32;
                    return false;
                }
            }
            ledger.applied.push(AppliedTransaction::new(transaction.clone()));
        }
        !self.fail.load(Ordering::SeqCst)
    }

    fn do_transaction(
        &self,
        transaction: &Transaction,
        ledger: &mut ClosingLedger,
        host: &dyn ContractHost,
    ) -> bool {
        if let Some(applied) = ledger.applied.last() {
            *self.seen_environment.lock() = applied.environment.clone();
        }

        let script = self.test_script.lock().clone().unwrap_or(TestScript {
            nested_ids: vec![1],
            block: false,
        });
        for invocation_id in &script.nested_ids {
            host.push_contract_id(*invocation_id);
        }
        if script.block {
            loop {
                if self.cancelled.load(Ordering::SeqCst) {
                    return false;
                }
                std::thread::sleep(SPIN_SLICE);
            }
        }

        let dest_address = transaction.operations.iter().find_map(|op| match op {
            Operation::Payment { dest_address, .. } => Some(*dest_address),
            _ => None,
        });
        if let Some(dest_address) = dest_address {
            host.push_log(&dest_address, vec!["contract invoked".to_string()]);
            host.push_return(&dest_address, serde_json::json!({ "ok": true }));
        }
        for _ in &script.nested_ids {
            host.pop_contract_id();
        }

        if let Some(applied) = ledger.applied.last_mut() {
            applied.result = ExecResult::success();
            applied.instructions.push(TransactionReceipt {
                transaction: transaction.clone(),
                ledger_seq: 0,
                close_time: CalyxTime::from_millis(0),
                result: ExecResult::success(),
            });
        }
        true
    }
}

/// Stand-in for the contract interpreter: records cancellations in order and
/// flips the shared cancellation flag the applier stubs spin on.
pub struct MockRuntime {
    pub cancel_log: Mutex<Vec<i64>>,
    pub query_calls: AtomicUsize,
    pub query_result: Mutex<serde_json::Value>,
    cancelled: Arc<AtomicBool>,
}

impl MockRuntime {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        MockRuntime {
            cancel_log: Mutex::new(Vec::new()),
            query_calls: AtomicUsize::new(0),
            query_result: Mutex::new(serde_json::json!({ "balance": 42 })),
            cancelled,
        }
    }
}

impl ContractRuntime for MockRuntime {
    fn query(
        &self,
        _contract_type: calyx_models::account::ContractType,
        parameter: &ContractParameter,
        host: &dyn ContractHost,
        result: &mut serde_json::Value,
    ) -> bool {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        host.push_contract_id(100);
        let value = self.query_result.lock().clone();
        host.push_return(&parameter.this_address, value.clone());
        *result = value;
        host.pop_contract_id();
        true
    }

    fn cancel(&self, invocation_id: i64) {
        self.cancel_log.lock().push(invocation_id);
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// In-memory closed-ledger store.
pub struct MockLedgerStore {
    last_closed: LedgerHeader,
    accounts: Mutex<BTreeMap<Address, Account>>,
}

impl MockLedgerStore {
    fn new(last_closed: LedgerHeader) -> Self {
        MockLedgerStore {
            last_closed,
            accounts: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn insert_account(&self, account: Account) {
        self.accounts.lock().insert(account.address, account);
    }
}

impl LedgerStore for MockLedgerStore {
    fn account_from_db(&self, address: &Address) -> Option<Account> {
        self.accounts.lock().get(address).cloned()
    }

    fn last_closed_header(&self) -> LedgerHeader {
        self.last_closed.clone()
    }
}

/// Builds a fresh, wired set of collaborator stubs sharing one cancellation
/// flag.
pub fn get_sample_collaborators() -> (Arc<MockApplier>, Arc<MockRuntime>, Arc<MockLedgerStore>) {
    let cancelled = Arc::new(AtomicBool::new(false));
    let applier = Arc::new(MockApplier::new(cancelled.clone()));
    let runtime = Arc::new(MockRuntime::new(cancelled));
    let store = Arc::new(MockLedgerStore::new(LedgerHeader {
        seq: 4,
        close_time: CalyxTime::from_millis(1_000_000),
        previous_hash: Hash::compute_from(b"ledger 3"),
        consensus_value_hash: Hash::compute_from(b"consensus value 4"),
        version: 1,
    }));
    (applier, runtime, store)
}

pub fn get_random_address() -> Address {
    Address::from_public_key(&KeyPair::generate().get_public_key())
}

/// A consensus value with `tx_count` single-payment transactions.
pub fn get_sample_value(ledger_seq: u64, tx_count: usize) -> ConsensusValue {
    let transactions = (0..tx_count)
        .map(|index| Transaction {
            source_address: get_random_address(),
            operations: vec![Operation::Payment {
                dest_address: get_random_address(),
                input: format!("{{\"op\":{}}}", index),
            }],
        })
        .collect();
    ConsensusValue {
        ledger_seq,
        close_time: CalyxTime::from_millis(1_000_000 + ledger_seq),
        previous_ledger_hash: Hash::compute_from(b"previous ledger"),
        transactions,
    }
}

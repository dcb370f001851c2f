use crate::error::PreExecutionError;
use calyx_models::account::Account;
use calyx_models::address::Address;
use calyx_models::consensus_value::ConsensusValue;
use calyx_models::ledger::{ExecResult, LedgerHeader};
use calyx_models::transaction::{Transaction, TransactionReceipt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Callback fired exactly once when an asynchronous pre-execution completes,
/// with the terminal outcome of the run.
pub type PreProcessCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Ephemeral accounts materialized for a test/query job.
///
/// Private to its job; reads fall through to the real store when an address
/// has no synthetic entry.
#[derive(Debug, Clone, Default)]
pub struct SyntheticEnvironment {
    entries: BTreeMap<Address, Account>,
}

impl SyntheticEnvironment {
    /// Creates an empty environment
    pub fn new() -> Self {
        Default::default()
    }

    /// Installs an account; refuses to overwrite an existing entry
    pub fn add_entry(&mut self, account: Account) -> Result<(), PreExecutionError> {
        let address = account.address;
        if self.entries.insert(address, account).is_some() {
            return Err(PreExecutionError::SynthesisFailed(format!(
                "account {} already installed",
                address
            )));
        }
        Ok(())
    }

    /// Looks up a synthetic account
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.entries.get(address)
    }

    /// Number of installed accounts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the environment is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One applied transaction of a closing ledger: the transaction itself, the
/// synthetic environment it ran against (test jobs only), its terminal result
/// and the per-instruction store entries it produced.
#[derive(Debug, Clone)]
pub struct AppliedTransaction {
    /// the applied transaction
    pub transaction: Transaction,
    /// environment the transaction ran against, for test jobs
    pub environment: Option<SyntheticEnvironment>,
    /// terminal result of the transaction
    pub result: ExecResult,
    /// store entries produced while applying, one per instruction
    pub instructions: Vec<TransactionReceipt>,
}

impl AppliedTransaction {
    /// Creates a pending entry for a transaction about to be applied
    pub fn new(transaction: Transaction) -> Self {
        AppliedTransaction {
            transaction,
            environment: None,
            result: ExecResult::success(),
            instructions: Vec::new(),
        }
    }
}

/// The mutable builder for the ledger that would result from applying a
/// consensus value. Owned by its job; the applier fills it in; callers may
/// read it only once the job is terminal.
#[derive(Debug, Clone, Default)]
pub struct ClosingLedger {
    /// header of the ledger being built
    pub header: Option<LedgerHeader>,
    /// the consensus value being applied
    pub consensus_value: Option<ConsensusValue>,
    /// transactions applied so far, in application order
    pub applied: Vec<AppliedTransaction>,
}

/// Whether a test job executes a trigger transaction or only queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCallMode {
    /// synthesize and apply a payment transaction to the contract
    Execute,
    /// call the interpreter's query entry point, no ledger mutation
    Query,
}

/// Parameters of a contract test/query job
#[derive(Debug, Clone)]
pub struct ContractTestParameter {
    /// address of the contract under test; a fresh account carrying `code`
    /// is synthesized when absent
    pub contract_address: Option<Address>,
    /// textual source address; replaced by a fresh address when it is
    /// unknown to the store and not syntactically valid
    pub source_address: String,
    /// contract code under test
    pub code: String,
    /// input payload handed to the contract
    pub input: String,
    /// execute or query
    pub call_mode: TestCallMode,
}

/// Parameter block handed to the contract interpreter's query entry point
#[derive(Debug, Clone)]
pub struct ContractParameter {
    /// contract code to run
    pub code: String,
    /// calling address
    pub sender: Address,
    /// address of the contract being run
    pub this_address: Address,
    /// input payload
    pub input: String,
    /// index of the triggering operation inside its transaction
    pub ope_index: u32,
    /// serialized triggering transaction; a placeholder document for queries
    pub trigger_tx: String,
    /// serialized consensus value the query runs against
    pub consensus_value: String,
}

/// Outcome of `async_pre_process`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreProcessStatus {
    /// an identical pre-execution already completed successfully
    CachedSuccess,
    /// the worker thread could not be spawned; the job was discarded
    StartFailed,
    /// a worker is running; the callback reports the outcome
    Running,
}

/// One contract log entry: the emitting address and its lines, in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLog {
    /// address of the emitting contract
    pub address: Address,
    /// emitted lines
    pub lines: Vec<String>,
}

/// Everything `sync_test_process` harvests from a completed test job
#[derive(Debug, Clone, Default)]
pub struct TestProcessOutput {
    /// logs pushed by the contract interpreter, in append order
    pub logs: Vec<ContractLog>,
    /// store entries of the applied transactions, one per instruction,
    /// enriched with the ledger sequence and close time
    pub txs: Vec<TransactionReceipt>,
    /// values returned by contract invocations, in append order
    pub returns: Vec<serde_json::Value>,
}

impl Serialize for TestProcessOutput {
    /// Renders logs as an object keyed `"{n}-{address}"`, where `n` is the
    /// append index, the keying contract logs carry on the RPC surface.
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let logs: BTreeMap<String, &Vec<String>> = self
            .logs
            .iter()
            .enumerate()
            .map(|(index, log)| (format!("{}-{}", index, log.address), &log.lines))
            .collect();
        let mut state = s.serialize_struct("TestProcessOutput", 3)?;
        state.serialize_field("logs", &logs)?;
        state.serialize_field("txs", &self.txs)?;
        state.serialize_field("returns", &self.returns)?;
        state.end()
    }
}

/// Registry occupancy, for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// number of completed jobs held in cache
    pub completed_size: usize,
    /// number of running jobs
    pub running_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use calyx_hash::Hash;

    #[test]
    fn test_output_rendering_keys_logs_by_index_and_address() {
        let addr_a = Address(Hash::compute_from(b"contract a"));
        let addr_b = Address(Hash::compute_from(b"contract b"));
        let output = TestProcessOutput {
            logs: vec![
                ContractLog {
                    address: addr_a,
                    lines: vec!["first".to_string()],
                },
                ContractLog {
                    address: addr_b,
                    lines: vec!["second".to_string(), "third".to_string()],
                },
            ],
            txs: Vec::new(),
            returns: vec![serde_json::json!(7)],
        };

        let rendered = serde_json::to_value(&output).unwrap();
        let logs = rendered["logs"].as_object().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(
            logs.get(format!("0-{}", addr_a).as_str()).unwrap(),
            &serde_json::json!(["first"])
        );
        assert_eq!(
            logs.get(format!("1-{}", addr_b).as_str()).unwrap(),
            &serde_json::json!(["second", "third"])
        );
        assert_eq!(rendered["txs"], serde_json::json!([]));
        assert_eq!(rendered["returns"], serde_json::json!([7]));
    }
}

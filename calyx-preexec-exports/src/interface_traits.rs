//! Contracts of the external collaborators the engine drives. The real
//! implementations live in the ledger and contract subsystems; the engine
//! only relies on the behaviors stated here.

use crate::host_traits::ContractHost;
use crate::types::{ClosingLedger, ContractParameter};
use calyx_models::account::{Account, ContractType};
use calyx_models::address::Address;
use calyx_models::consensus_value::ConsensusValue;
use calyx_models::ledger::LedgerHeader;
use calyx_models::transaction::Transaction;
use calyx_time::CalyxTime;

/// Applies transactions to a closing ledger.
pub trait TransactionApplier: Send + Sync {
    /// Apply every transaction of `consensus_value` to `ledger`.
    ///
    /// The applier must call `host.push_contract_id` / `pop_contract_id`
    /// around every contract invocation, append logs and returns through
    /// `host`, and set `timeout_tx_index` to the index of the first
    /// transaction exceeding `tx_timeout` (leaving it `-1` otherwise).
    /// A `tx_timeout` of `None` disables the per-transaction budget; the
    /// commit path applies without one.
    ///
    /// # Returns
    /// `true` when the whole consensus value applied successfully.
    fn apply(
        &self,
        consensus_value: &ConsensusValue,
        ledger: &mut ClosingLedger,
        host: &dyn ContractHost,
        tx_timeout: Option<CalyxTime>,
        timeout_tx_index: &mut i32,
    ) -> bool;

    /// Apply a single already-registered transaction; used by the test path
    /// to run the synthesized trigger transaction.
    fn do_transaction(
        &self,
        transaction: &Transaction,
        ledger: &mut ClosingLedger,
        host: &dyn ContractHost,
    ) -> bool;
}

/// The embedded contract interpreter.
pub trait ContractRuntime: Send + Sync {
    /// Run a read-only contract query.
    ///
    /// # Returns
    /// `true` on success; `result` receives the query output.
    fn query(
        &self,
        contract_type: ContractType,
        parameter: &ContractParameter,
        host: &dyn ContractHost,
        result: &mut serde_json::Value,
    ) -> bool;

    /// Ask the invocation with the given id to abort at its next safe point.
    ///
    /// Must be callable from any thread and must not block on the invocation
    /// actually stopping.
    fn cancel(&self, invocation_id: i64);
}

/// Read-only view of the closed ledger state.
pub trait LedgerStore: Send + Sync {
    /// Fetch an account from the closed-ledger store
    fn account_from_db(&self, address: &Address) -> Option<Account>;

    /// Header of the last closed ledger
    fn last_closed_header(&self) -> LedgerHeader;
}

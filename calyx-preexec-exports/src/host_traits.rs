use calyx_models::address::Address;
use calyx_models::transaction::Transaction;

/// Callbacks a job exposes to the applier and the contract interpreter while
/// it runs.
///
/// The interpreter must call `push_contract_id` on entry to each (possibly
/// nested) invocation and `pop_contract_id` on exit; cancellation tears the
/// stacked invocations down in reverse order. Pushes and pops balance under
/// normal completion; residual ids after cancellation are tolerated and
/// dropped with the job.
pub trait ContractHost: Send + Sync {
    /// Append log lines emitted by the contract at `address`
    fn push_log(&self, address: &Address, lines: Vec<String>);

    /// Append a contract return value.
    ///
    /// The address argument is kept for interface stability; returns are
    /// accumulated as a plain append-only list.
    fn push_return(&self, address: &Address, value: serde_json::Value);

    /// Record entry into a contract invocation
    fn push_contract_id(&self, invocation_id: i64);

    /// Record exit from the innermost contract invocation
    fn pop_contract_id(&self);

    /// Innermost active contract invocation, if any
    fn top_contract_id(&self) -> Option<i64>;

    /// Transaction currently being applied, consulted by the interpreter for
    /// its "current tx" context
    fn current_transaction(&self) -> Option<Transaction>;
}

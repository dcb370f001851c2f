use calyx_hash::Hash;
use calyx_time::CalyxTime;
use serde::{Deserialize, Serialize};

/// Header of a closed (or closing) ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// ledger sequence
    pub seq: u64,
    /// ledger close time
    pub close_time: CalyxTime,
    /// hash of the previous ledger
    pub previous_hash: Hash,
    /// fingerprint of the consensus value this ledger was built from
    pub consensus_value_hash: Hash,
    /// ledger format version, inherited from the previous ledger
    pub version: u32,
}

/// Result codes surfaced by the execution paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// execution succeeded
    Success,
    /// internal failure, e.g. a worker thread could not be spawned
    InternalError,
    /// the execution exceeded its wall-clock budget
    TxTimeout,
    /// the applier rejected the transaction
    ApplyFail,
    /// a synthetic account could not be installed
    SynthesisFail,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ErrorCode::Success => write!(f, "success"),
            ErrorCode::InternalError => write!(f, "internal error"),
            ErrorCode::TxTimeout => write!(f, "transaction timeout"),
            ErrorCode::ApplyFail => write!(f, "apply failure"),
            ErrorCode::SynthesisFail => write!(f, "synthesis failure"),
        }
    }
}

/// Structured result of one execution: a code plus a description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// result code
    pub code: ErrorCode,
    /// human-readable description
    pub desc: String,
}

impl ExecResult {
    /// Builds a result from a code and description
    pub fn new(code: ErrorCode, desc: impl Into<String>) -> Self {
        ExecResult {
            code,
            desc: desc.into(),
        }
    }

    /// A successful result with no description
    pub fn success() -> Self {
        ExecResult {
            code: ErrorCode::Success,
            desc: String::new(),
        }
    }

    /// Whether the result is a success
    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl Default for ExecResult {
    fn default() -> Self {
        ExecResult::success()
    }
}

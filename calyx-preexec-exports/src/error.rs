//! this file defines all possible pre-execution error categories

use displaydoc::Display;
use thiserror::Error;

/// Errors of the pre-execution component.
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum PreExecutionError {
    /// could not spawn the worker thread: {0}
    StartFailed(String),

    /// wall-clock budget exceeded, first timed-out transaction index: {0}
    Timeout(i32),

    /// a prior identical pre-execution failed
    CachedFailure,

    /// the applier rejected the consensus value: {0}
    ApplyFailed(String),

    /// could not install a synthetic account: {0}
    SynthesisFailed(String),

    /// models error: {0}
    ModelsError(#[from] calyx_models::error::ModelsError),
}

//! Implementation of the ledger pre-execution engine.
//!
//! The engine speculatively executes proposed consensus values ahead of
//! commit, deduplicating runs by fingerprint and caching their closing
//! ledgers, and serves contract tests and queries against synthetic
//! environments. See `calyx-preexec-exports` for the public interface.

mod context;
mod controller;
mod registry;
mod sweeper;

pub use sweeper::start_preexec_worker;

#[cfg(test)]
mod tests;

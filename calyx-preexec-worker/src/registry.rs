//! Thread-safe directory of pre-execution jobs, keyed by consensus-value
//! fingerprint.
//!
//! A fingerprint may map to several running jobs at once (identical values
//! racing before one completes) but to at most one completed job: the first
//! completer wins and later duplicates are dropped. Both maps live under one
//! mutex; no external call is ever made while holding it.

use crate::context::PreExecutionContext;
use calyx_hash::Hash;
use calyx_preexec_exports::{ClosingLedger, RegistryStatus};
use calyx_time::CalyxTime;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct RegistryMaps {
    /// running jobs; multimap, same-fingerprint duplicates allowed
    running: BTreeMap<Hash, Vec<Arc<PreExecutionContext>>>,
    /// completed jobs, cached until a commit prunes them
    completed: BTreeMap<Hash, Arc<PreExecutionContext>>,
}

/// The job registry
pub(crate) struct ContextRegistry {
    ctxs: Mutex<RegistryMaps>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry {
            ctxs: Mutex::new(RegistryMaps::default()),
        }
    }

    /// Probes the completed map.
    ///
    /// # Returns
    /// `Some(outcome)` when an identical job completed, `None` otherwise.
    pub fn check_complete(&self, fingerprint: &Hash) -> Option<bool> {
        self.ctxs
            .lock()
            .completed
            .get(fingerprint)
            .map(|ctx| ctx.exe_result())
    }

    /// Closing ledger of a completed job, if any
    pub fn completed_ledger(&self, fingerprint: &Hash) -> Option<ClosingLedger> {
        self.ctxs
            .lock()
            .completed
            .get(fingerprint)
            .map(|ctx| ctx.closing_ledger())
    }

    /// Inserts a job into the running map
    pub fn enlist_running(&self, fingerprint: Hash, ctx: Arc<PreExecutionContext>) {
        self.ctxs
            .lock()
            .running
            .entry(fingerprint)
            .or_default()
            .push(ctx);
    }

    /// Removes a job from the running map by pointer identity, without
    /// completing it; used when its worker could not be spawned.
    pub fn discard_running(&self, ctx: &PreExecutionContext) {
        let fingerprint = match ctx.fingerprint() {
            Some(fingerprint) => fingerprint,
            None => return,
        };
        let mut maps = self.ctxs.lock();
        if let Some(entries) = maps.running.get_mut(&fingerprint) {
            entries.retain(|entry| !std::ptr::eq(Arc::as_ptr(entry), ctx));
            if entries.is_empty() {
                maps.running.remove(&fingerprint);
            }
        }
    }

    /// Moves a job out of the running map into the completed map, locating it
    /// by pointer identity.
    ///
    /// When another job with the same fingerprint completed first, the later
    /// arriver is dropped here: its result is redundant.
    pub fn move_running_to_complete(&self, ctx: &PreExecutionContext) {
        let fingerprint = match ctx.fingerprint() {
            Some(fingerprint) => fingerprint,
            None => return,
        };
        let mut maps = self.ctxs.lock();
        let mut completer = None;
        if let Some(entries) = maps.running.get_mut(&fingerprint) {
            if let Some(position) = entries
                .iter()
                .position(|entry| std::ptr::eq(Arc::as_ptr(entry), ctx))
            {
                completer = Some(entries.remove(position));
            }
            if entries.is_empty() {
                maps.running.remove(&fingerprint);
            }
        }
        let completer = match completer {
            Some(completer) => completer,
            None => return,
        };
        if maps.completed.contains_key(&fingerprint) {
            debug!("dropping redundant pre-execution of {}", fingerprint);
            return;
        }
        maps.completed.insert(fingerprint, completer);
    }

    /// Prunes every completed job whose consensus value closed a ledger with
    /// sequence lower than or equal to `ledger_seq`
    pub fn remove_completed(&self, ledger_seq: u64) {
        self.ctxs.lock().completed.retain(|_, ctx| {
            ctx.ledger_seq()
                .map_or(true, |seq| seq > ledger_seq)
        });
    }

    /// Running jobs past the given wall-clock budget. Cancellation happens at
    /// the caller, outside the registry lock.
    pub fn snapshot_expired(&self, budget: CalyxTime) -> Vec<Arc<PreExecutionContext>> {
        self.ctxs
            .lock()
            .running
            .values()
            .flatten()
            .filter(|ctx| ctx.check_expired(budget))
            .cloned()
            .collect()
    }

    /// Registry occupancy
    pub fn status(&self) -> RegistryStatus {
        let maps = self.ctxs.lock();
        RegistryStatus {
            completed_size: maps.completed.len(),
            running_size: maps.running.values().map(Vec::len).sum(),
        }
    }
}

//! Store lease and fire-and-forget dispatch.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::engine::ValidationEngine;
use crate::request::ValidationRequest;

/// Exclusive use of the engine's completion store for one run.
///
/// Acquiring the lease serializes runs sharing the same runner and clears
/// whatever a previous run left in the store, whichever store the engine
/// writes to.
pub(crate) struct StoreLease<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StoreLease<'a> {
    pub(crate) fn acquire(lock: &'a Mutex<()>, engine: &dyn ValidationEngine) -> Self {
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = engine.clear_completions() {
            warn!(status = %e.status(), error = %e, "failed to clear completion store");
        }
        Self { _guard: guard }
    }
}

/// Hand `batch` to the engine. A rejected dispatch is only logged; its
/// requests surface later as missing completions.
pub(crate) fn dispatch(engine: &dyn ValidationEngine, batch: Vec<ValidationRequest>) {
    let batch_size = batch.len();
    if let Err(e) = engine.dispatch_async(batch) {
        warn!(
            batch_size,
            status = %e.status(),
            error = %e,
            "engine rejected dispatch"
        );
    }
}

//! Validation engines: the asynchronous side of a blocking run.
//!
//! The runner only talks to an engine through [`ValidationEngine`]. The
//! local engine here is one implementation; tests use the scripted fake in
//! [`crate::fakes`].
//!
//! # Modules
//!
//! - [`error`]     — `EngineError` / `EngineResult`
//! - [`validator`] — `SettingsValidator` seam and the process-backed `CommandValidator`
//! - [`local`]     — `LocalValidationEngine` (tokio runtime, per-item timeout)
//! - [`progress`]  — `ProgressSignal`, wakes a waiting runner on each completion

pub mod error;
pub mod local;
pub mod progress;
pub mod validator;

use std::time::Duration;

use minibench_store::BenchmarkEvent;

use crate::request::ValidationRequest;

pub use error::{EngineError, EngineResult};
pub use local::LocalValidationEngine;
pub use progress::ProgressSignal;
pub use validator::{CommandValidator, SettingsValidator, ValidationContext, ValidatorFailure};

/// Contract between the blocking runner and an execution engine.
///
/// An engine runs every dispatched request in isolation under its own
/// per-item timeout and appends exactly one [`BenchmarkEvent`] per request
/// to its completion store, failures included.
pub trait ValidationEngine: Send + Sync {
    /// Prepare the engine. The runner forwards the result verbatim.
    fn initialize(&self) -> EngineResult<()>;

    /// Drop every completion left in the store, so the next batch starts
    /// from zero.
    fn clear_completions(&self) -> EngineResult<()>;

    /// Start validating `batch` and return without waiting.
    fn dispatch_async(&self, batch: Vec<ValidationRequest>) -> EngineResult<()>;

    /// Completion events written so far.
    fn completed_count(&self) -> usize;

    /// Every completion event currently in the store.
    fn fetch_completed(&self) -> Vec<BenchmarkEvent>;

    /// Block for at most `max_wait`, returning early if the engine can tell
    /// that a new completion was written.
    fn wait_for_progress(&self, max_wait: Duration) {
        std::thread::sleep(max_wait);
    }
}

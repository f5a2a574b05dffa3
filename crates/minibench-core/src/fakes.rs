//! Scripted engine for exercising the runner without real validators.
//!
//! [`ScriptedEngine`] writes completions to a file store from plain threads,
//! following a per-request [`Script`]. It counts initializations and
//! dispatches so tests can assert on side effects.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use minibench_store::{
    BenchmarkError, BenchmarkEvent, BenchmarkResult, BenchmarkStage, CompletionStore, ErrorCode,
    FileCompletionStore,
};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::engine::{EngineError, EngineResult, ProgressSignal, ValidationEngine};
use crate::request::ValidationRequest;

/// What the scripted engine does with one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Write a successful completion carrying the request id.
    Complete { delay: Duration },
    /// Write an error completion with `code`.
    Fail { delay: Duration, code: ErrorCode },
    /// Write a successful completion without a request id, like an engine
    /// that only echoes settings.
    CompleteWithoutId { delay: Duration },
    /// Never write anything.
    Silent,
}

impl Script {
    pub fn complete() -> Self {
        Script::Complete {
            delay: Duration::ZERO,
        }
    }

    pub fn complete_after(delay: Duration) -> Self {
        Script::Complete { delay }
    }

    pub fn fail(code: ErrorCode) -> Self {
        Script::Fail {
            delay: Duration::ZERO,
            code,
        }
    }
}

type ScriptFn = dyn Fn(usize, &ValidationRequest) -> Script + Send + Sync;

pub struct ScriptedEngine {
    store: Arc<FileCompletionStore>,
    script: Arc<ScriptFn>,
    clock: Arc<dyn Clock>,
    progress: Arc<ProgressSignal>,
    fail_initialize: bool,
    reject_dispatch: bool,
    initialized: AtomicBool,
    initializations: AtomicUsize,
    dispatches: AtomicUsize,
    clears: AtomicUsize,
    count_reads: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScriptedEngine {
    /// Engine writing to a file store at `storage_path`. `script` receives
    /// the zero-based dispatch number and the request.
    pub fn new<F>(storage_path: impl Into<PathBuf>, script: F) -> Self
    where
        F: Fn(usize, &ValidationRequest) -> Script + Send + Sync + 'static,
    {
        Self {
            store: Arc::new(FileCompletionStore::new(storage_path)),
            script: Arc::new(script),
            clock: Arc::new(SystemClock),
            progress: Arc::new(ProgressSignal::new()),
            fail_initialize: false,
            reject_dispatch: false,
            initialized: AtomicBool::new(false),
            initializations: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            count_reads: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// `initialize` fails with `PreconditionNotMet`.
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// `dispatch_async` fails with `DispatchRejected`.
    pub fn rejecting_dispatch(mut self) -> Self {
        self.reject_dispatch = true;
        self
    }

    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Times the completion count was read.
    pub fn count_reads(&self) -> usize {
        self.count_reads.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Wait for every scripted write, including ones that land after a
    /// runner has already returned.
    pub fn join(&self) {
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            let _ = worker.join();
        }
    }

    fn completion(
        clock: &dyn Clock,
        request: &ValidationRequest,
        script: &Script,
    ) -> Option<BenchmarkEvent> {
        let (boot, wall) = (clock.boot_time_micros(), clock.wall_time_micros());
        let ok = BenchmarkResult {
            ok: true,
            ..Default::default()
        };
        match script {
            Script::Complete { .. } => Some(
                BenchmarkEvent::success(request.settings.clone(), ok, boot, wall)
                    .with_request_id(request.id),
            ),
            Script::CompleteWithoutId { .. } => Some(BenchmarkEvent::success(
                request.settings.clone(),
                ok,
                boot,
                wall,
            )),
            Script::Fail { code, .. } => Some(
                BenchmarkEvent::error(
                    request.settings.clone(),
                    BenchmarkError::new(BenchmarkStage::Inference, *code),
                    boot,
                    wall,
                )
                .with_request_id(request.id),
            ),
            Script::Silent => None,
        }
    }
}

impl ValidationEngine for ScriptedEngine {
    fn initialize(&self) -> EngineResult<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(EngineError::PreconditionNotMet(
                "scripted initialize failure".into(),
            ));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_completions(&self) -> EngineResult<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.store.clear()?;
        Ok(())
    }

    fn dispatch_async(&self, batch: Vec<ValidationRequest>) -> EngineResult<()> {
        let dispatch_no = self.dispatches.fetch_add(1, Ordering::SeqCst);
        if self.reject_dispatch {
            return Err(EngineError::DispatchRejected(
                "scripted dispatch rejection".into(),
            ));
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for request in batch {
            let script = (self.script)(dispatch_no, &request);
            let delay = match &script {
                Script::Complete { delay }
                | Script::CompleteWithoutId { delay }
                | Script::Fail { delay, .. } => *delay,
                Script::Silent => continue,
            };

            let store = Arc::clone(&self.store);
            let clock = Arc::clone(&self.clock);
            let progress = Arc::clone(&self.progress);
            workers.push(std::thread::spawn(move || {
                std::thread::sleep(delay);
                if let Some(event) = Self::completion(clock.as_ref(), &request, &script) {
                    if let Err(e) = store.append(&event) {
                        warn!(error = %e, "scripted completion not written");
                    }
                    progress.notify();
                }
            }));
        }
        Ok(())
    }

    fn completed_count(&self) -> usize {
        self.count_reads.fetch_add(1, Ordering::SeqCst);
        self.store.count().unwrap_or(0)
    }

    fn fetch_completed(&self) -> Vec<BenchmarkEvent> {
        self.store.fetch_all().unwrap_or_default()
    }

    fn wait_for_progress(&self, max_wait: Duration) {
        let seen = self.progress.generation();
        self.progress.wait_past(seen, max_wait);
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.join();
    }
}

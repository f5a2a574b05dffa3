//! Local validation engine on a private tokio runtime.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use minibench_store::{
    BenchmarkError, BenchmarkEvent, BenchmarkStage, CompletionStore, ErrorCode,
    FileCompletionStore,
};
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult};
use super::progress::ProgressSignal;
use super::validator::{SettingsValidator, ValidationContext};
use super::ValidationEngine;
use crate::clock::{Clock, SystemClock};
use crate::options::{BenchmarkResultEvaluator, CustomInput, ModelSource, ValidatorRunnerOptions};
use crate::request::ValidationRequest;

/// State shared by every validation task.
struct EngineShared<V> {
    validator: V,
    store: Arc<dyn CompletionStore>,
    context: ValidationContext,
    per_test_timeout: Duration,
    evaluator: Option<Arc<dyn BenchmarkResultEvaluator>>,
    clock: Arc<dyn Clock>,
    progress: ProgressSignal,
    permits: Semaphore,
}

impl<V: SettingsValidator> EngineShared<V> {
    async fn run_one(&self, request: ValidationRequest) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        debug!(request_id = %request.id, digest = %request.digest.short(), "validation started");

        let outcome = tokio::time::timeout(
            self.per_test_timeout,
            self.validator.validate(&request.settings, &self.context),
        )
        .await;

        let boottime_us = self.clock.boot_time_micros();
        let wallclock_us = self.clock.wall_time_micros();
        let event = match outcome {
            Ok(Ok(mut result)) => {
                if let Some(evaluator) = &self.evaluator {
                    result.ok = evaluator.has_passed(&request.settings, &result);
                }
                BenchmarkEvent::success(request.settings, result, boottime_us, wallclock_us)
            }
            Ok(Err(failure)) => BenchmarkEvent::error(
                request.settings,
                failure.into_benchmark_error(),
                boottime_us,
                wallclock_us,
            ),
            Err(_elapsed) => {
                let mut error =
                    BenchmarkError::new(BenchmarkStage::Unknown, ErrorCode::ValidationTimedOut);
                error.message = Some(format!(
                    "timed out after {} ms",
                    self.per_test_timeout.as_millis()
                ));
                BenchmarkEvent::error(request.settings, error, boottime_us, wallclock_us)
            }
        }
        .with_request_id(request.id);

        debug!(
            request_id = %request.id,
            event_type = ?event.event_type,
            "validation finished"
        );
        if let Err(e) = self.store.append(&event) {
            warn!(request_id = %request.id, error = %e, "failed to record completion");
        }
        self.progress.notify();
    }
}

/// Engine that runs validations concurrently on its own runtime.
///
/// Each request gets one task; at most `max_concurrency` validate at once and
/// each is bounded by the per-test timeout. Completions are appended to the
/// store as they finish, and a waiting runner is woken through
/// [`ProgressSignal`].
///
/// The engine owns a tokio runtime, so it must be dropped outside of any
/// async context.
pub struct LocalValidationEngine<V: SettingsValidator> {
    shared: Arc<EngineShared<V>>,
    runtime: Runtime,
    model: Option<ModelSource>,
    custom_input: Option<CustomInput>,
    initialized: AtomicBool,
}

impl<V: SettingsValidator> LocalValidationEngine<V> {
    /// Engine writing to a file store at `options.storage_path`.
    pub fn new(options: &ValidatorRunnerOptions, validator: V) -> EngineResult<Self> {
        let store = Arc::new(FileCompletionStore::new(&options.storage_path));
        Self::with_store(options, validator, store, Arc::new(SystemClock))
    }

    pub fn with_store(
        options: &ValidatorRunnerOptions,
        validator: V,
        store: Arc<dyn CompletionStore>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        if options.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrency must be positive".into(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.max_concurrency.clamp(1, 4))
            .thread_name("minibench-engine")
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;

        let model = options.model_source();
        let custom_input = options.effective_custom_input().cloned();
        let custom_input_dir = custom_input
            .as_ref()
            .map(|_| options.data_directory_path.join("custom_input"));
        let context = ValidationContext {
            model: model.clone(),
            data_directory: options.data_directory_path.clone(),
            entrypoint: options.validation_entrypoint_name.clone(),
            custom_input_dir,
            custom_input_batch_size: custom_input.as_ref().map(|c| c.batch_size),
        };

        Ok(Self {
            shared: Arc::new(EngineShared {
                validator,
                store,
                context,
                per_test_timeout: options.per_test_timeout,
                evaluator: options.benchmark_result_evaluator.clone(),
                clock,
                progress: ProgressSignal::new(),
                permits: Semaphore::new(options.max_concurrency),
            }),
            runtime,
            model,
            custom_input,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &ValidationContext {
        &self.shared.context
    }

    fn check_model(&self) -> EngineResult<()> {
        match &self.model {
            None => Err(EngineError::PreconditionNotMet(
                "no model path or descriptor configured".into(),
            )),
            Some(ModelSource::Path(path)) if !path.is_file() => {
                Err(EngineError::ModelUnavailable { path: path.clone() })
            }
            Some(ModelSource::Path(_)) | Some(ModelSource::FileDescriptor(_)) => Ok(()),
        }
    }

    fn write_custom_input(&self) -> EngineResult<()> {
        let (Some(input), Some(dir)) = (&self.custom_input, &self.shared.context.custom_input_dir)
        else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|source| EngineError::CustomInput {
            path: dir.clone(),
            source,
        })?;
        for (i, blob) in input.data.iter().enumerate() {
            let path: PathBuf = dir.join(format!("{i}.bin"));
            fs::write(&path, blob).map_err(|source| EngineError::CustomInput { path, source })?;
        }
        debug!(blobs = input.data.len(), dir = %dir.display(), "wrote custom input");
        Ok(())
    }
}

impl<V: SettingsValidator> ValidationEngine for LocalValidationEngine<V> {
    fn initialize(&self) -> EngineResult<()> {
        self.check_model()?;

        let data_dir = &self.shared.context.data_directory;
        fs::create_dir_all(data_dir).map_err(|source| EngineError::DataDirectory {
            path: data_dir.clone(),
            source,
        })?;
        self.write_custom_input()?;

        self.initialized.store(true, Ordering::Release);
        info!(
            model = %self.model.as_ref().map(ModelSource::token).unwrap_or_default(),
            data_dir = %data_dir.display(),
            "validation engine initialized"
        );
        Ok(())
    }

    fn clear_completions(&self) -> EngineResult<()> {
        self.shared.store.clear()?;
        Ok(())
    }

    fn dispatch_async(&self, batch: Vec<ValidationRequest>) -> EngineResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(EngineError::NotInitialized);
        }

        let batch_size = batch.len();
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            let tasks = batch.into_iter().map(|request| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.run_one(request).await })
            });
            let outcomes = futures::future::join_all(tasks).await;

            let aborted = outcomes.iter().filter(|o| o.is_err()).count();
            if aborted > 0 {
                warn!(aborted, "validation tasks ended without a completion record");
            }
            debug!(batch_size, "dispatched batch drained");
        });
        Ok(())
    }

    fn completed_count(&self) -> usize {
        self.shared.store.count().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read completion count");
            0
        })
    }

    fn fetch_completed(&self) -> Vec<BenchmarkEvent> {
        self.shared.store.fetch_all().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read completion store");
            Vec::new()
        })
    }

    fn wait_for_progress(&self, max_wait: Duration) {
        let seen = self.shared.progress.generation();
        self.shared.progress.wait_past(seen, max_wait);
    }
}

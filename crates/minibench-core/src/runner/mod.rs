//! Blocking validation runner.
//!
//! `trigger_validation` runs one batch end to end on the calling thread:
//!
//! ```text
//! normalize -> lease + clear store -> dispatch -> poll until matched or deadline
//!           -> fetch -> reconcile -> return one record per request
//! ```
//!
//! Validation problems never fail the call. Requests without a completion
//! come back as synthesized `completion_event_missing` errors.

mod dispatch;
mod normalize;
pub mod poll;
mod reconcile;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use minibench_store::{AccelerationSettings, BenchmarkEvent};
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::engine::{EngineResult, LocalValidationEngine, SettingsValidator, ValidationEngine};
use crate::obs::{self, ValidationSpan};
use crate::options::ValidatorRunnerOptions;

use dispatch::{dispatch, StoreLease};
use normalize::normalize;
use poll::{wait_for_completions, Deadline, PollOutcome, POLL_INTERVAL};
use reconcile::reconcile;

/// Outcome of one blocking run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// One record per requested settings.
    pub records: Vec<BenchmarkEvent>,
    pub outcome: PollOutcome,
    pub total_timeout_ms: u64,
    /// Records written by the engine.
    pub genuine: usize,
    /// Records synthesized for missing completions.
    pub synthesized: usize,
    /// Store records that matched no request and were dropped.
    pub discarded: usize,
}

impl ValidationReport {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            outcome: PollOutcome::CompletedOnTime,
            total_timeout_ms: 0,
            genuine: 0,
            synthesized: 0,
            discarded: 0,
        }
    }

    pub fn timed_out(&self) -> bool {
        !self.outcome.within_timeout()
    }
}

/// Synchronous façade over an asynchronous [`ValidationEngine`].
///
/// Calls on one runner are serialized. Two runners must not share an
/// engine or a completion store while both are running.
pub struct BlockingValidatorRunner {
    engine: Arc<dyn ValidationEngine>,
    clock: Arc<dyn Clock>,
    per_test_timeout: Duration,
    store_lock: Mutex<()>,
    poll_interval: Duration,
}

impl BlockingValidatorRunner {
    /// Runner backed by a [`LocalValidationEngine`] built from `options`.
    pub fn new<V: SettingsValidator>(
        options: &ValidatorRunnerOptions,
        validator: V,
    ) -> EngineResult<Self> {
        let engine = LocalValidationEngine::new(options, validator)?;
        Ok(Self::with_engine(options, Arc::new(engine)))
    }

    /// Runner around an existing engine. Only the timing fields of
    /// `options` are used; the engine owns its store.
    pub fn with_engine(options: &ValidatorRunnerOptions, engine: Arc<dyn ValidationEngine>) -> Self {
        Self {
            engine,
            clock: Arc::new(SystemClock),
            per_test_timeout: options.per_test_timeout,
            store_lock: Mutex::new(()),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn per_test_timeout(&self) -> Duration {
        self.per_test_timeout
    }

    /// Initialize the engine; its result is returned unchanged.
    pub fn initialize(&self) -> EngineResult<()> {
        self.engine.initialize()
    }

    /// Validate `for_settings` and block until every one has a record or the
    /// deadline passes.
    ///
    /// The result has exactly one record per input; an empty input returns
    /// immediately without touching the engine or the store.
    pub fn trigger_validation<'a, I>(&self, for_settings: I) -> Vec<BenchmarkEvent>
    where
        I: IntoIterator<Item = &'a AccelerationSettings>,
    {
        self.trigger_validation_report(for_settings).records
    }

    /// [`trigger_validation`](Self::trigger_validation) with run diagnostics.
    pub fn trigger_validation_report<'a, I>(&self, for_settings: I) -> ValidationReport
    where
        I: IntoIterator<Item = &'a AccelerationSettings>,
    {
        let requests = normalize(for_settings);
        if requests.is_empty() {
            return ValidationReport::empty();
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let _span = ValidationSpan::enter(&run_id);
        let _lease = StoreLease::acquire(&self.store_lock, self.engine.as_ref());
        debug!("store leased");

        let expected = requests.len();
        dispatch(self.engine.as_ref(), requests.clone());

        let deadline = Deadline::compute(
            self.clock.boot_time_micros(),
            self.per_test_timeout,
            expected,
        );
        obs::emit_validation_dispatched(expected, deadline.total_timeout_ms());

        let poll = wait_for_completions(
            self.engine.as_ref(),
            self.clock.as_ref(),
            &requests,
            &deadline,
            self.poll_interval,
        );
        obs::emit_poll_finished(
            poll.outcome,
            poll.observed,
            expected,
            u64::try_from(poll.waited.as_millis()).unwrap_or(u64::MAX),
        );

        let fetched = self.engine.fetch_completed();
        if !poll.outcome.within_timeout() {
            warn!(
                "Validation timed out after {} ms. Return before all tests finished.",
                deadline.total_timeout_ms()
            );
        } else if fetched.len() != expected {
            warn!(
                "Validation completed. Started benchmarking for {} settings, received {} results.",
                expected,
                fetched.len()
            );
        }

        let reconciled = reconcile(&requests, fetched, self.clock.as_ref());
        obs::emit_validation_finished(
            reconciled.genuine,
            reconciled.synthesized,
            !poll.outcome.within_timeout(),
        );

        ValidationReport {
            records: reconciled.records,
            outcome: poll.outcome,
            total_timeout_ms: deadline.total_timeout_ms(),
            genuine: reconciled.genuine,
            synthesized: reconciled.synthesized,
            discarded: reconciled.discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Script, ScriptedEngine};
    use minibench_store::{Delegate, ErrorCode};

    fn runner(dir: &tempfile::TempDir, engine: Arc<ScriptedEngine>) -> BlockingValidatorRunner {
        let opts = ValidatorRunnerOptions::new(dir.path().join("results.jsonl"), dir.path())
            .with_per_test_timeout(Duration::from_millis(50));
        BlockingValidatorRunner::with_engine(&opts, engine)
    }

    #[test]
    fn test_initialize_forwards_engine_status() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            ScriptedEngine::new(dir.path().join("results.jsonl"), |_, _| Script::complete())
                .failing_initialize(),
        );
        let runner = runner(&dir, engine.clone());
        let err = runner.initialize().unwrap_err();
        assert_eq!(err.status(), ErrorCode::PreconditionNotMet);
        assert_eq!(engine.initializations(), 1);
    }

    #[test]
    fn test_empty_batch_report() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(
            dir.path().join("results.jsonl"),
            |_, _| Script::complete(),
        ));
        let report = runner(&dir, engine.clone())
            .trigger_validation_report(&Vec::<AccelerationSettings>::new());
        assert!(report.records.is_empty());
        assert!(!report.timed_out());
        assert_eq!(engine.dispatches(), 0);
        assert_eq!(engine.clears(), 0);
    }

    #[test]
    fn test_report_counts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(
            dir.path().join("results.jsonl"),
            |_, request| match request.settings.delegate {
                Delegate::Gpu => Script::Silent,
                _ => Script::complete(),
            },
        ));
        let runner = runner(&dir, engine.clone());
        let batch = vec![
            AccelerationSettings::new(Delegate::Xnnpack),
            AccelerationSettings::new(Delegate::Gpu),
        ];

        let report = runner.trigger_validation_report(&batch);
        engine.join();

        assert!(report.timed_out());
        assert_eq!(report.total_timeout_ms, 150);
        assert_eq!(report.genuine, 1);
        assert_eq!(report.synthesized, 1);
        assert_eq!(report.records.len(), 2);
    }
}

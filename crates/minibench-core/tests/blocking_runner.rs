//! End-to-end tests for `BlockingValidatorRunner` against scripted and real
//! engines.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use minibench_core::fakes::{Script, ScriptedEngine};
use minibench_core::{
    AccelerationSettings, BenchmarkStage, BlockingValidatorRunner, Clock, CommandValidator,
    Delegate, EngineError, ErrorCode, LocalValidationEngine, RequestId, SystemClock,
    ValidationEngine, ValidationRequest, ValidatorRunnerOptions,
};
use minibench_store::fakes::MemoryCompletionStore;
use tempfile::TempDir;

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn options(dir: &TempDir, per_test_ms: u64) -> ValidatorRunnerOptions {
    ValidatorRunnerOptions::new(dir.path().join("results.jsonl"), dir.path().join("data"))
        .with_per_test_timeout(Duration::from_millis(per_test_ms))
}

fn scripted<F>(dir: &TempDir, script: F) -> Arc<ScriptedEngine>
where
    F: Fn(usize, &ValidationRequest) -> Script + Send + Sync + 'static,
{
    let engine = ScriptedEngine::new(dir.path().join("results.jsonl"), script);
    engine.initialize().unwrap();
    Arc::new(engine)
}

fn settings(delegates: &[Delegate]) -> Vec<AccelerationSettings> {
    delegates
        .iter()
        .map(|d| AccelerationSettings::new(*d))
        .collect()
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

#[test]
fn test_all_completed_returns_one_record_per_input() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, _| Script::complete_after(Duration::from_millis(5)));
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 2000), engine.clone());
    let batch = settings(&[Delegate::Xnnpack, Delegate::Gpu, Delegate::Nnapi]);

    let start = Instant::now();
    let report = runner.trigger_validation_report(&batch);

    // Returns as soon as the count is reached, well before the 8s deadline.
    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(!report.timed_out());
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.genuine, 3);
    assert_eq!(report.synthesized, 0);
    for s in &batch {
        let matching = report.records.iter().filter(|r| r.settings == *s).count();
        assert_eq!(matching, 1, "expected exactly one record for {}", s.delegate);
    }
    assert!(report.records.iter().all(|r| !r.is_error()));
}

#[test]
fn test_silent_requests_are_synthesized() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, request| match request.settings.delegate {
        Delegate::Hexagon | Delegate::EdgeTpu => Script::Silent,
        _ => Script::complete(),
    });
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 30), engine.clone());
    let batch = settings(&[
        Delegate::Hexagon,
        Delegate::Xnnpack,
        Delegate::EdgeTpu,
        Delegate::Gpu,
    ]);

    let records = runner.trigger_validation(&batch);
    engine.join();

    assert_eq!(records.len(), 4);
    // Genuine records first, then synthesized ones in batch order.
    assert!(!records[0].is_error());
    assert!(!records[1].is_error());
    for (record, delegate) in records[2..].iter().zip([Delegate::Hexagon, Delegate::EdgeTpu]) {
        assert_eq!(record.settings.delegate, delegate);
        let error = record.error.as_ref().unwrap();
        assert_eq!(error.stage, BenchmarkStage::Unknown);
        assert_eq!(error.code, ErrorCode::CompletionEventMissing);
        assert_eq!(error.message.as_deref(), Some("completion event missing"));
    }
}

#[test]
fn test_empty_batch_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("results.jsonl");
    std::fs::write(&store_path, b"left by someone else\n").unwrap();

    let engine = scripted(&dir, |_, _| Script::complete());
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 100), engine.clone());

    let records = runner.trigger_validation(&Vec::<AccelerationSettings>::new());

    assert!(records.is_empty());
    assert_eq!(engine.dispatches(), 0);
    assert_eq!(engine.count_reads(), 0);
    assert_eq!(engine.clears(), 0);
    assert_eq!(
        std::fs::read(&store_path).unwrap(),
        b"left by someone else\n".to_vec()
    );
}

#[test]
fn test_sequential_calls_do_not_leak_results() {
    let dir = tempfile::tempdir().unwrap();
    let seen: Arc<Mutex<Vec<(usize, RequestId)>>> = Arc::default();
    let engine = {
        let seen = Arc::clone(&seen);
        scripted(&dir, move |dispatch_no, request| {
            seen.lock().unwrap().push((dispatch_no, request.id));
            match dispatch_no {
                // First call: lands after its 200ms deadline, during call two.
                0 => Script::complete_after(Duration::from_millis(300)),
                // Second call: never in time.
                _ => Script::complete_after(Duration::from_millis(1500)),
            }
        })
    };
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 100), engine.clone());
    let batch = settings(&[Delegate::Gpu]);

    let first = runner.trigger_validation(&batch);
    let second = runner.trigger_validation_report(&batch);
    engine.join();

    let ids = seen.lock().unwrap().clone();
    let first_id = ids.iter().find(|(n, _)| *n == 0).unwrap().1;
    let second_id = ids.iter().find(|(n, _)| *n == 1).unwrap().1;

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].request_id, Some(first_id));

    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].request_id, Some(second_id));
    assert!(second
        .records
        .iter()
        .all(|r| r.request_id != Some(first_id)));
}

#[test]
fn test_late_record_from_previous_call_does_not_end_next_wait() {
    let dir = tempfile::tempdir().unwrap();
    let seen: Arc<Mutex<Vec<(usize, RequestId)>>> = Arc::default();
    let engine = {
        let seen = Arc::clone(&seen);
        scripted(&dir, move |dispatch_no, request| {
            seen.lock().unwrap().push((dispatch_no, request.id));
            match dispatch_no {
                // Misses its own 400ms deadline and lands ~100ms into call two.
                0 => Script::complete_after(Duration::from_millis(500)),
                // Well inside call two's 400ms deadline.
                _ => Script::complete_after(Duration::from_millis(250)),
            }
        })
    };
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 200), engine.clone());
    let batch = settings(&[Delegate::Gpu]);

    let first = runner.trigger_validation_report(&batch);
    let second = runner.trigger_validation_report(&batch);
    engine.join();

    let ids = seen.lock().unwrap().clone();
    let second_id = ids.iter().find(|(n, _)| *n == 1).unwrap().1;

    assert!(first.timed_out());
    assert!(!second.timed_out());
    assert_eq!(second.genuine, 1);
    assert_eq!(second.synthesized, 0);
    assert_eq!(second.discarded, 1);
    assert_eq!(second.records[0].request_id, Some(second_id));
    assert!(!second.records[0].is_error());
}

#[test]
fn test_memory_store_engine_is_cleared_between_calls() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.tflite");
    std::fs::write(&model, b"weights").unwrap();
    let opts = options(&dir, 2000).with_model_path(&model);

    let engine = LocalValidationEngine::with_store(
        &opts,
        CommandValidator::new(vec!["true".into()]).unwrap(),
        Arc::new(MemoryCompletionStore::new()),
        Arc::new(SystemClock),
    )
    .unwrap();
    let runner = BlockingValidatorRunner::with_engine(&opts, Arc::new(engine));
    runner.initialize().unwrap();
    let batch = settings(&[Delegate::Xnnpack]);

    let first = runner.trigger_validation_report(&batch);
    let second = runner.trigger_validation_report(&batch);

    for report in [&first, &second] {
        assert!(!report.timed_out());
        assert_eq!(report.genuine, 1);
        assert_eq!(report.synthesized, 0);
        assert_eq!(report.discarded, 0);
        assert!(!report.records[0].is_error());
    }
    assert_ne!(first.records[0].request_id, second.records[0].request_id);
}

#[test]
fn test_duplicate_settings_keep_separate_slots() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, _| Script::complete());
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 1000), engine.clone());
    let batch = settings(&[Delegate::Gpu, Delegate::Gpu]);

    let records = runner.trigger_validation(&batch);

    assert_eq!(records.len(), 2);
    assert_ne!(records[0].request_id, records[1].request_id);
    assert!(records.iter().all(|r| !r.is_error()));
}

#[test]
fn test_duplicate_settings_matched_without_ids() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, request| match request.settings.delegate {
        Delegate::Gpu => Script::CompleteWithoutId {
            delay: Duration::ZERO,
        },
        _ => Script::Silent,
    });
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 30), engine.clone());
    let batch = settings(&[Delegate::Gpu, Delegate::Nnapi, Delegate::Gpu]);

    let report = runner.trigger_validation_report(&batch);

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.genuine, 2);
    assert_eq!(report.synthesized, 1);
    assert_eq!(report.records[2].settings.delegate, Delegate::Nnapi);
    assert!(report.records[2].is_error());
}

#[test]
fn test_synthesized_timestamps_not_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, _| Script::Silent);
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 10), engine.clone());

    let boot_before = SystemClock.boot_time_micros();
    let wall_before = SystemClock.wall_time_micros();
    let records = runner.trigger_validation(&settings(&[Delegate::Coral]));

    assert_eq!(records.len(), 1);
    assert!(records[0].boottime_us >= boot_before);
    assert!(records[0].wallclock_us >= wall_before);
}

// -------------------------------------------------------------------------
// Timeout and engine failures
// -------------------------------------------------------------------------

#[test]
fn test_one_completion_then_silence_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, request| match request.settings.delegate {
        Delegate::Xnnpack => Script::complete_after(Duration::from_millis(10)),
        _ => Script::Silent,
    });
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 100), engine.clone());

    let start = Instant::now();
    let report = runner.trigger_validation_report(&settings(&[Delegate::Xnnpack, Delegate::Gpu]));
    let elapsed = start.elapsed();

    // Deadline is 100ms x (1 + 2).
    assert_eq!(report.total_timeout_ms, 300);
    assert!(report.timed_out());
    assert!(elapsed >= Duration::from_millis(300), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "returned after {elapsed:?}");

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].settings.delegate, Delegate::Xnnpack);
    assert!(!report.records[0].is_error());
    assert_eq!(report.records[1].settings.delegate, Delegate::Gpu);
    assert_eq!(
        report.records[1].error_code(),
        Some(ErrorCode::CompletionEventMissing)
    );
}

#[test]
fn test_engine_failures_are_returned_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let engine = scripted(&dir, |_, request| match request.settings.delegate {
        Delegate::Gpu => Script::fail(ErrorCode::ValidatorExited),
        _ => Script::complete(),
    });
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 1000), engine.clone());

    let report = runner.trigger_validation_report(&settings(&[Delegate::Gpu, Delegate::Nnapi]));

    assert!(!report.timed_out());
    assert_eq!(report.genuine, 2);
    let gpu = report
        .records
        .iter()
        .find(|r| r.settings.delegate == Delegate::Gpu)
        .unwrap();
    assert_eq!(gpu.error_code(), Some(ErrorCode::ValidatorExited));
}

#[test]
fn test_rejected_dispatch_yields_all_missing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedEngine::new(dir.path().join("results.jsonl"), |_, _| Script::complete())
            .rejecting_dispatch(),
    );
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 20), engine.clone());

    let records = runner.trigger_validation(&settings(&[Delegate::Gpu, Delegate::Xnnpack]));

    assert_eq!(engine.dispatches(), 1);
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.error_code() == Some(ErrorCode::CompletionEventMissing)));
}

#[test]
fn test_initialize_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedEngine::new(dir.path().join("results.jsonl"), |_, _| Script::complete())
            .failing_initialize(),
    );
    let runner = BlockingValidatorRunner::with_engine(&options(&dir, 20), engine.clone());

    let err = runner.initialize().unwrap_err();
    assert!(matches!(err, EngineError::PreconditionNotMet(_)));
    assert!(!engine.is_initialized());
}

// -------------------------------------------------------------------------
// Local engine with a process validator
// -------------------------------------------------------------------------

#[test]
fn test_local_engine_without_model_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let validator = CommandValidator::new(vec!["true".into()]).unwrap();
    let runner = BlockingValidatorRunner::new(&options(&dir, 100), validator).unwrap();

    let err = runner.initialize().unwrap_err();
    assert_eq!(err.status(), ErrorCode::PreconditionNotMet);
}

#[test]
fn test_local_engine_with_command_validator() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.tflite");
    std::fs::write(&model, b"weights").unwrap();
    let opts = options(&dir, 5000)
        .with_model_path(&model)
        .with_max_concurrency(2);

    // Fails for gpu, reports a metric otherwise.
    let validator = CommandValidator::new(vec![
        "sh".into(),
        "-c".into(),
        r#"if grep -q '"gpu"'; then echo 'gpu unsupported' >&2; exit 2; fi; echo '{"metrics": {"accuracy": 1.0}}'"#.into(),
    ])
    .unwrap();
    let runner = BlockingValidatorRunner::new(&opts, validator).unwrap();
    runner.initialize().unwrap();

    let report = runner.trigger_validation_report(&settings(&[Delegate::Xnnpack, Delegate::Gpu]));

    assert!(!report.timed_out());
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.genuine, 2);

    let xnnpack = report
        .records
        .iter()
        .find(|r| r.settings.delegate == Delegate::Xnnpack)
        .unwrap();
    let result = xnnpack.result.as_ref().unwrap();
    assert!(result.ok);
    assert_eq!(result.metrics.get("accuracy"), Some(&1.0));

    let gpu = report
        .records
        .iter()
        .find(|r| r.settings.delegate == Delegate::Gpu)
        .unwrap();
    let error = gpu.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::ValidatorExited);
    assert_eq!(error.exit_code, Some(2));
    assert_eq!(error.message.as_deref(), Some("gpu unsupported"));
}

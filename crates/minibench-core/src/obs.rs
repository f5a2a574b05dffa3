//! Structured observability hooks for the blocking validation lifecycle.
//!
//! Each run gets a `ValidationSpan`; the emitters below log the state
//! transitions of a run (`dispatched`, `poll_finished`, `finished`) plus
//! every synthesized missing completion.

use minibench_store::{RequestId, SettingsDigest};
use tracing::{info, warn};

use crate::runner::poll::PollOutcome;

/// RAII guard that enters a run-scoped tracing span for the duration of one
/// `trigger_validation` call.
pub struct ValidationSpan {
    _span: tracing::span::EnteredSpan,
}

impl ValidationSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("minibench.validation", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_validation_dispatched(batch_size: usize, total_timeout_ms: u64) {
    info!(
        event = "validation.dispatched",
        batch_size = batch_size,
        total_timeout_ms = total_timeout_ms,
    );
}

pub fn emit_poll_finished(outcome: PollOutcome, observed: usize, expected: usize, waited_ms: u64) {
    info!(
        event = "validation.poll_finished",
        outcome = %outcome,
        observed = observed,
        expected = expected,
        waited_ms = waited_ms,
    );
}

/// A request got no completion record and is being reported as failed.
pub fn emit_completion_missing(request_id: &RequestId, digest: &SettingsDigest) {
    warn!(
        event = "validation.completion_missing",
        request_id = %request_id,
        settings = %digest.short(),
    );
}

pub fn emit_records_discarded(count: usize) {
    warn!(
        event = "validation.records_discarded",
        count = count,
        "completion records matched no request in this batch"
    );
}

pub fn emit_validation_finished(genuine: usize, synthesized: usize, timed_out: bool) {
    info!(
        event = "validation.finished",
        genuine = genuine,
        synthesized = synthesized,
        timed_out = timed_out,
    );
}

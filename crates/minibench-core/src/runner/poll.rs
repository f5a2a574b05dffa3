//! Deadline guard and the completion poll loop.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::reconcile::count_matched;
use crate::clock::Clock;
use crate::engine::ValidationEngine;
use crate::request::ValidationRequest;

/// Wait between two reads of the completion count.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How the poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    CompletedOnTime,
    TimedOut,
}

impl PollOutcome {
    pub fn within_timeout(&self) -> bool {
        matches!(self, PollOutcome::CompletedOnTime)
    }
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::CompletedOnTime => f.write_str("completed_on_time"),
            PollOutcome::TimedOut => f.write_str("timed_out"),
        }
    }
}

/// Outer timeout for a whole batch: `per_test_timeout × (1 + N)` from
/// dispatch.
///
/// The engine enforces the per-item timeout itself; this only bounds how
/// long the caller waits if the engine stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub dispatched_at_us: u64,
    pub total_timeout: Duration,
    pub deadline_us: u64,
}

impl Deadline {
    pub fn compute(dispatched_at_us: u64, per_test_timeout: Duration, batch_size: usize) -> Self {
        let factor = u32::try_from(batch_size.saturating_add(1)).unwrap_or(u32::MAX);
        let total_timeout = per_test_timeout.saturating_mul(factor);
        let total_us = u64::try_from(total_timeout.as_micros()).unwrap_or(u64::MAX);
        Self {
            dispatched_at_us,
            total_timeout,
            deadline_us: dispatched_at_us.saturating_add(total_us),
        }
    }

    pub fn total_timeout_ms(&self) -> u64 {
        u64::try_from(self.total_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn is_past(&self, now_us: u64) -> bool {
        now_us >= self.deadline_us
    }

    pub fn remaining(&self, now_us: u64) -> Duration {
        Duration::from_micros(self.deadline_us.saturating_sub(now_us))
    }
}

/// Result of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub outcome: PollOutcome,
    /// Requests of the batch holding a completion at the last check.
    pub observed: usize,
    pub waited: Duration,
}

/// Block until every request in `requests` has a matching completion or the
/// deadline passes.
///
/// The raw store count only decides when to look closer. Records that match
/// no request of this batch never end the wait.
pub(crate) fn wait_for_completions(
    engine: &dyn ValidationEngine,
    clock: &dyn Clock,
    requests: &[ValidationRequest],
    deadline: &Deadline,
    interval: Duration,
) -> PollReport {
    let expected = requests.len();
    let report = |outcome, observed| {
        let now = clock.boot_time_micros();
        PollReport {
            outcome,
            observed,
            waited: Duration::from_micros(now.saturating_sub(deadline.dispatched_at_us)),
        }
    };

    loop {
        if engine.completed_count() >= expected {
            let matched = count_matched(requests, &engine.fetch_completed());
            if matched >= expected {
                return report(PollOutcome::CompletedOnTime, matched);
            }
        }
        let now = clock.boot_time_micros();
        if deadline.is_past(now) {
            let matched = count_matched(requests, &engine.fetch_completed());
            return report(PollOutcome::TimedOut, matched);
        }
        engine.wait_for_progress(interval.min(deadline.remaining(now)));
    }
}

//! Matching fetched completions back to the requests of a batch.
//!
//! Completions that echo a request id are matched by id. The rest are matched
//! by settings equality, positionally: each request, in batch order, takes the
//! first unused completion with equal settings, so duplicate settings in one
//! batch each keep their own slot. Requests left over get a synthesized
//! `completion_event_missing` error.

use minibench_store::{BenchmarkError, BenchmarkEvent, BenchmarkStage, ErrorCode};

use crate::clock::Clock;
use crate::obs;
use crate::request::ValidationRequest;

#[derive(Debug, Default)]
pub(crate) struct Reconciliation {
    /// Matched completions in fetch order, then synthesized failures in batch
    /// order. Always one per request.
    pub records: Vec<BenchmarkEvent>,
    pub genuine: usize,
    pub synthesized: usize,
    /// Fetched completions that matched no request.
    pub discarded: usize,
}

/// Which requests found a completion and which completions were taken.
struct Claims {
    claimed: Vec<bool>,
    used: Vec<bool>,
}

fn claim(requests: &[ValidationRequest], fetched: &[BenchmarkEvent]) -> Claims {
    let mut claimed = vec![false; requests.len()];
    let mut used = vec![false; fetched.len()];

    for (fi, event) in fetched.iter().enumerate() {
        let Some(id) = event.request_id else {
            continue;
        };
        if let Some(ri) = requests.iter().position(|r| r.id == id) {
            if !claimed[ri] {
                claimed[ri] = true;
                used[fi] = true;
            }
        }
    }

    for (ri, request) in requests.iter().enumerate() {
        if claimed[ri] {
            continue;
        }
        let candidate = (0..fetched.len()).find(|&fi| {
            !used[fi] && fetched[fi].request_id.is_none() && request.matches(&fetched[fi])
        });
        if let Some(fi) = candidate {
            claimed[ri] = true;
            used[fi] = true;
        }
    }

    Claims { claimed, used }
}

/// Number of requests that `fetched` would satisfy under [`reconcile`].
pub(crate) fn count_matched(requests: &[ValidationRequest], fetched: &[BenchmarkEvent]) -> usize {
    claim(requests, fetched).claimed.iter().filter(|c| **c).count()
}

pub(crate) fn reconcile(
    requests: &[ValidationRequest],
    fetched: Vec<BenchmarkEvent>,
    clock: &dyn Clock,
) -> Reconciliation {
    let Claims { claimed, used } = claim(requests, &fetched);

    let discarded = used.iter().filter(|u| !**u).count();
    if discarded > 0 {
        obs::emit_records_discarded(discarded);
    }

    let mut records: Vec<BenchmarkEvent> = fetched
        .into_iter()
        .zip(used)
        .filter_map(|(event, used)| used.then_some(event))
        .collect();
    let genuine = records.len();

    for (request, _) in requests.iter().zip(&claimed).filter(|(_, c)| !**c) {
        obs::emit_completion_missing(&request.id, &request.digest);
        records.push(missing_completion(request, clock));
    }

    Reconciliation {
        synthesized: records.len() - genuine,
        records,
        genuine,
        discarded,
    }
}

/// Failure record standing in for a completion the engine never wrote.
pub(crate) fn missing_completion(request: &ValidationRequest, clock: &dyn Clock) -> BenchmarkEvent {
    let mut error = BenchmarkError::new(BenchmarkStage::Unknown, ErrorCode::CompletionEventMissing);
    error.message = Some(ErrorCode::CompletionEventMissing.to_string());
    BenchmarkEvent::error(
        request.settings.clone(),
        error,
        clock.boot_time_micros(),
        clock.wall_time_micros(),
    )
    .with_request_id(request.id)
}

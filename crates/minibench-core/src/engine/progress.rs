//! Completion signal shared between engine workers and a waiting runner.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Generation counter bumped on every appended completion.
#[derive(Debug, Default)]
pub struct ProgressSignal {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl ProgressSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the generation moves past `seen` or `max_wait` elapses.
    ///
    /// Returns `true` when progress was observed.
    pub fn wait_past(&self, seen: u64, max_wait: Duration) -> bool {
        let guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _timeout) = self
            .cond
            .wait_timeout_while(guard, max_wait, |generation| *generation == seen)
            .unwrap_or_else(PoisonError::into_inner);
        *guard != seen
    }
}

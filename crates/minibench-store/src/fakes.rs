//! In-memory fakes for the store traits (testing only)

use std::sync::{Mutex, PoisonError};

use crate::schema::BenchmarkEvent;
use crate::store_traits::{CompletionStore, StorageResult};

/// In-memory completion store backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryCompletionStore {
    events: Mutex<Vec<BenchmarkEvent>>,
}

impl MemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionStore for MemoryCompletionStore {
    fn append(&self, event: &BenchmarkEvent) -> StorageResult<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push(event.clone());
        Ok(())
    }

    fn count(&self) -> StorageResult<usize> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events.len())
    }

    fn fetch_all(&self) -> StorageResult<Vec<BenchmarkEvent>> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events.clone())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.clear();
        Ok(())
    }
}

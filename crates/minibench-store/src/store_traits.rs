//! Completion store trait.
//!
//! The engine is the single writer; the blocking runner reads the count and
//! the full contents while it waits. In-memory fakes are provided for testing
//! via the `fakes` module.

use crate::error::StoreError;
use crate::schema::BenchmarkEvent;

/// Result type for store operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

/// Append-only store of completion events for one validation run.
///
/// Guarantees:
/// - `append` never reorders: `fetch_all` returns events in append order.
/// - `count()` equals `fetch_all().len()` at the same instant.
/// - `clear` leaves the store empty; clearing an empty store is a no-op.
pub trait CompletionStore: Send + Sync {
    /// Append one event.
    fn append(&self, event: &BenchmarkEvent) -> StorageResult<()>;

    /// Number of complete events written so far.
    fn count(&self) -> StorageResult<usize>;

    /// All complete events, in append order.
    fn fetch_all(&self) -> StorageResult<Vec<BenchmarkEvent>>;

    /// Drop every stored event.
    fn clear(&self) -> StorageResult<()>;
}

//! minibench-store: completion records for minibench
//!
//! This crate owns the on-disk contract between a validation engine and the
//! blocking runner that waits on it.
//!
//! ## Key Components
//!
//! - `AccelerationSettings`: the configuration under validation
//! - `BenchmarkEvent`: one completion record, embedding the settings it ran
//! - `CompletionStore`: append-only store trait
//! - `FileCompletionStore`: JSON-lines implementation on a single path

mod error;
pub mod fakes;
mod file_store;
pub mod schema;
pub mod store_traits;

pub use error::StoreError;
pub use file_store::FileCompletionStore;
pub use schema::{
    AccelerationSettings, BenchmarkError, BenchmarkEvent, BenchmarkEventType, BenchmarkResult,
    BenchmarkStage, Delegate, ErrorCode, RequestId, SettingsDigest,
};
pub use store_traits::{CompletionStore, StorageResult};

//! Error types for validation engines.

use std::path::PathBuf;

use minibench_store::{ErrorCode, StoreError};

/// Errors produced by an engine or by runner configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("model file not found: {}", .path.display())]
    ModelUnavailable { path: PathBuf },

    #[error("invalid model reference: {0}")]
    InvalidModelReference(String),

    #[error("data directory {} unavailable: {source}", .path.display())]
    DataDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write custom input {}: {source}", .path.display())]
    CustomInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine not initialized")]
    NotInitialized,

    #[error("dispatch rejected: {0}")]
    DispatchRejected(String),

    #[error("engine runtime unavailable: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Status code reported for this failure.
    pub fn status(&self) -> ErrorCode {
        match self {
            EngineError::PreconditionNotMet(_) | EngineError::InvalidConfig(_) => {
                ErrorCode::PreconditionNotMet
            }
            EngineError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            EngineError::InvalidModelReference(_) => ErrorCode::InvalidModelReference,
            EngineError::DataDirectory { .. } | EngineError::Store(_) => {
                ErrorCode::DataDirectoryUnavailable
            }
            EngineError::CustomInput { .. } => ErrorCode::CustomInputWriteFailed,
            EngineError::NotInitialized => ErrorCode::EngineNotInitialized,
            EngineError::DispatchRejected(_) | EngineError::Runtime(_) => {
                ErrorCode::DispatchRejected
            }
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

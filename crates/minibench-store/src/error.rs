//! Error types for minibench-store

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the completion store layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error on the store path
    #[error("Store I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = StoreError::io(
            "/tmp/results.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/results.jsonl"));
        assert!(msg.contains("denied"));
    }
}

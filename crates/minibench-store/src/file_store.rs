//! JSON-lines completion store on the local filesystem.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::schema::BenchmarkEvent;
use crate::store_traits::{CompletionStore, StorageResult};

/// Completion store backed by a single file, one JSON event per line.
///
/// Readers re-read the file on every call. A trailing line without its
/// newline is a write in progress and is not counted; a malformed complete
/// line is logged and skipped.
#[derive(Debug)]
pub struct FileCompletionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCompletionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the store file at `path`. A missing file is not an error.
    pub fn clear_path(path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "cleared completion store");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn read_events(&self) -> StorageResult<Vec<BenchmarkEvent>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        // Everything after the last newline is still being written.
        let complete = match contents.rfind('\n') {
            Some(end) => &contents[..end],
            None => return Ok(Vec::new()),
        };

        let mut events = Vec::new();
        for (lineno, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BenchmarkEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed completion record"
                ),
            }
        }
        Ok(events)
    }
}

impl CompletionStore for FileCompletionStore {
    fn append(&self, event: &BenchmarkEvent) -> StorageResult<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    fn count(&self) -> StorageResult<usize> {
        Ok(self.read_events()?.len())
    }

    fn fetch_all(&self) -> StorageResult<Vec<BenchmarkEvent>> {
        self.read_events()
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Self::clear_path(&self.path)
    }
}

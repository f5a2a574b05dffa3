//! Runner construction options and the model reference token.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use minibench_store::{AccelerationSettings, BenchmarkResult};
use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};

/// Per-test timeout used when none is configured.
pub const DEFAULT_PER_TEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// A model embedded in an already-open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFileDescriptor {
    pub fd: i32,
    pub offset: u64,
    pub size: u64,
}

/// Where the engine loads the model from.
///
/// Renders to a single string token: the path itself, or
/// `fd:<fd>:<offset>:<size>` for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Path(PathBuf),
    FileDescriptor(ModelFileDescriptor),
}

impl ModelSource {
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Path(path) => write!(f, "{}", path.display()),
            ModelSource::FileDescriptor(d) => write!(f, "fd:{}:{}:{}", d.fd, d.offset, d.size),
        }
    }
}

impl FromStr for ModelSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EngineError::InvalidModelReference("empty".into()));
        }
        let Some(rest) = s.strip_prefix("fd:") else {
            return Ok(ModelSource::Path(PathBuf::from(s)));
        };

        let parts: Vec<&str> = rest.split(':').collect();
        let [fd, offset, size] = parts.as_slice() else {
            return Err(EngineError::InvalidModelReference(format!(
                "expected fd:<fd>:<offset>:<size>, got {s}"
            )));
        };
        let invalid = |_| EngineError::InvalidModelReference(s.to_string());
        Ok(ModelSource::FileDescriptor(ModelFileDescriptor {
            fd: fd.parse().map_err(invalid)?,
            offset: offset.parse().map_err(invalid)?,
            size: size.parse().map_err(invalid)?,
        }))
    }
}

/// Caller-supplied inputs the engine feeds to the model instead of its
/// embedded validation data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomInput {
    pub batch_size: u32,
    pub data: Vec<Vec<u8>>,
}

/// Decides whether a successful benchmark passed.
pub trait BenchmarkResultEvaluator: Send + Sync {
    fn has_passed(&self, settings: &AccelerationSettings, result: &BenchmarkResult) -> bool;
}

/// Everything a runner and its engine are constructed from.
#[derive(Clone)]
pub struct ValidatorRunnerOptions {
    /// Inner timeout for a single settings validation.
    pub per_test_timeout: Duration,
    /// Completion store location; cleared at the start of every run.
    pub storage_path: PathBuf,
    pub data_directory_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub model_fd: Option<ModelFileDescriptor>,
    pub custom_input: Option<CustomInput>,
    pub benchmark_result_evaluator: Option<Arc<dyn BenchmarkResultEvaluator>>,
    pub validation_entrypoint_name: Option<String>,
    /// Validations the local engine runs at once.
    pub max_concurrency: usize,
}

impl fmt::Debug for ValidatorRunnerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRunnerOptions")
            .field("per_test_timeout", &self.per_test_timeout)
            .field("storage_path", &self.storage_path)
            .field("data_directory_path", &self.data_directory_path)
            .field("model_path", &self.model_path)
            .field("model_fd", &self.model_fd)
            .field("custom_input", &self.custom_input.as_ref().map(|c| c.data.len()))
            .field(
                "benchmark_result_evaluator",
                &self.benchmark_result_evaluator.is_some(),
            )
            .field("validation_entrypoint_name", &self.validation_entrypoint_name)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl ValidatorRunnerOptions {
    pub fn new(storage_path: impl Into<PathBuf>, data_directory_path: impl Into<PathBuf>) -> Self {
        Self {
            per_test_timeout: DEFAULT_PER_TEST_TIMEOUT,
            storage_path: storage_path.into(),
            data_directory_path: data_directory_path.into(),
            model_path: None,
            model_fd: None,
            custom_input: None,
            benchmark_result_evaluator: None,
            validation_entrypoint_name: None,
            max_concurrency: 1,
        }
    }

    pub fn with_per_test_timeout(mut self, timeout: Duration) -> Self {
        self.per_test_timeout = timeout;
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_model_fd(mut self, fd: i32, offset: u64, size: u64) -> Self {
        self.model_fd = Some(ModelFileDescriptor { fd, offset, size });
        self
    }

    pub fn with_custom_input(mut self, batch_size: u32, data: Vec<Vec<u8>>) -> Self {
        self.custom_input = Some(CustomInput { batch_size, data });
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn BenchmarkResultEvaluator>) -> Self {
        self.benchmark_result_evaluator = Some(evaluator);
        self
    }

    pub fn with_entrypoint(mut self, name: impl Into<String>) -> Self {
        self.validation_entrypoint_name = Some(name.into());
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// The model reference: an explicit path wins over a descriptor, and a
    /// negative descriptor means none was given.
    pub fn model_source(&self) -> Option<ModelSource> {
        if let Some(path) = self.model_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Some(ModelSource::Path(path.clone()));
        }
        self.model_fd
            .filter(|d| d.fd >= 0)
            .map(ModelSource::FileDescriptor)
    }

    /// Custom input to forward, if any was supplied with data.
    pub fn effective_custom_input(&self) -> Option<&CustomInput> {
        self.custom_input.as_ref().filter(|c| !c.data.is_empty())
    }
}

/// Serializable subset of [`ValidatorRunnerOptions`], loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub per_test_timeout_ms: u64,
    pub storage_path: PathBuf,
    pub data_directory_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub model_fd: Option<ModelFileDescriptor>,
    pub validation_entrypoint_name: Option<String>,
    pub max_concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            per_test_timeout_ms: DEFAULT_PER_TEST_TIMEOUT.as_millis() as u64,
            storage_path: PathBuf::from("minibench/results.jsonl"),
            data_directory_path: PathBuf::from("minibench/data"),
            model_path: None,
            model_fd: None,
            validation_entrypoint_name: None,
            max_concurrency: 1,
        }
    }
}

impl RunnerConfig {
    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.per_test_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "per_test_timeout_ms must be positive".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrency must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn into_options(self) -> ValidatorRunnerOptions {
        ValidatorRunnerOptions {
            per_test_timeout: Duration::from_millis(self.per_test_timeout_ms),
            storage_path: self.storage_path,
            data_directory_path: self.data_directory_path,
            model_path: self.model_path,
            model_fd: self.model_fd,
            custom_input: None,
            benchmark_result_evaluator: None,
            validation_entrypoint_name: self.validation_entrypoint_name,
            max_concurrency: self.max_concurrency,
        }
    }
}

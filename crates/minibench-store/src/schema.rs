//! Record schema for acceleration settings and benchmark events.
//!
//! `AccelerationSettings` is the unit of validation. The engine appends one
//! `BenchmarkEvent` per settings to the completion store, embedding a copy of
//! the settings it ran so results can be matched back to their request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// AccelerationSettings
// ---------------------------------------------------------------------------

/// Delegate backing an acceleration configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delegate {
    #[default]
    None,
    Xnnpack,
    Gpu,
    Nnapi,
    Hexagon,
    EdgeTpu,
    Coral,
}

impl std::fmt::Display for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Delegate::None => "none",
            Delegate::Xnnpack => "xnnpack",
            Delegate::Gpu => "gpu",
            Delegate::Nnapi => "nnapi",
            Delegate::Hexagon => "hexagon",
            Delegate::EdgeTpu => "edge_tpu",
            Delegate::Coral => "coral",
        };
        f.write_str(name)
    }
}

/// One acceleration configuration to validate.
///
/// Identity is structural: two settings are the same request target when
/// they compare equal, regardless of where they came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelerationSettings {
    /// Delegate to run the model with.
    pub delegate: Delegate,
    /// CPU thread count, when the delegate honours one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<u32>,
    /// Delegate-specific options (precision, cache dirs, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl AccelerationSettings {
    pub fn new(delegate: Delegate) -> Self {
        Self {
            delegate,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, num_threads: u32) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// SHA-256 over the canonical JSON form.
    ///
    /// Options live in a `BTreeMap`, so key order never affects the digest.
    pub fn digest(&self) -> SettingsDigest {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        SettingsDigest::from_bytes(&bytes)
    }
}

/// Content digest of a settings value (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsDigest(String);

impl SettingsDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        SettingsDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for SettingsDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Correlation id assigned to each request of a batch.
///
/// Engines echo it back on the event they write; events without one are
/// matched by settings equality instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BenchmarkEvent
// ---------------------------------------------------------------------------

/// Classification of a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkEventType {
    Success,
    Error,
}

/// Stage at which a validation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStage {
    Unknown,
    Initialization,
    Inference,
}

/// Status codes shared by engine initialization and error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Success,
    PreconditionNotMet,
    ModelUnavailable,
    InvalidModelReference,
    DataDirectoryUnavailable,
    CustomInputWriteFailed,
    EngineNotInitialized,
    DispatchRejected,
    ValidatorSpawnFailed,
    ValidatorExited,
    ValidationTimedOut,
    CompletionEventMissing,
}

impl ErrorCode {
    /// Stable numeric code, as reported by status-returning entry points.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::PreconditionNotMet => 1,
            ErrorCode::ModelUnavailable => 100,
            ErrorCode::InvalidModelReference => 101,
            ErrorCode::DataDirectoryUnavailable => 102,
            ErrorCode::CustomInputWriteFailed => 103,
            ErrorCode::EngineNotInitialized => 200,
            ErrorCode::DispatchRejected => 201,
            ErrorCode::ValidatorSpawnFailed => 300,
            ErrorCode::ValidatorExited => 301,
            ErrorCode::ValidationTimedOut => 302,
            ErrorCode::CompletionEventMissing => 400,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::PreconditionNotMet => "precondition not met",
            ErrorCode::ModelUnavailable => "model unavailable",
            ErrorCode::InvalidModelReference => "invalid model reference",
            ErrorCode::DataDirectoryUnavailable => "data directory unavailable",
            ErrorCode::CustomInputWriteFailed => "custom input write failed",
            ErrorCode::EngineNotInitialized => "engine not initialized",
            ErrorCode::DispatchRejected => "dispatch rejected",
            ErrorCode::ValidatorSpawnFailed => "validator spawn failed",
            ErrorCode::ValidatorExited => "validator exited with failure",
            ErrorCode::ValidationTimedOut => "validation timed out",
            ErrorCode::CompletionEventMissing => "completion event missing",
        };
        f.write_str(name)
    }
}

/// Error detail attached to an `Error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkError {
    pub stage: BenchmarkStage,
    pub code: ErrorCode,
    /// Exit code of the validator process, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BenchmarkError {
    pub fn new(stage: BenchmarkStage, code: ErrorCode) -> Self {
        Self {
            stage,
            code,
            exit_code: None,
            message: None,
        }
    }
}

/// Benchmark outcome attached to a `Success` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Pass verdict. Set by the result evaluator when one is configured.
    pub ok: bool,
    pub duration_us: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

/// One completion record written by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEvent {
    /// Correlation id echoed from the request, if the engine knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Settings the event pertains to.
    pub settings: AccelerationSettings,
    pub event_type: BenchmarkEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BenchmarkResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BenchmarkError>,
    /// Process-relative monotonic time, microseconds.
    pub boottime_us: u64,
    /// Wall-clock time, microseconds since the Unix epoch.
    pub wallclock_us: i64,
}

impl BenchmarkEvent {
    pub fn success(
        settings: AccelerationSettings,
        result: BenchmarkResult,
        boottime_us: u64,
        wallclock_us: i64,
    ) -> Self {
        Self {
            request_id: None,
            settings,
            event_type: BenchmarkEventType::Success,
            result: Some(result),
            error: None,
            boottime_us,
            wallclock_us,
        }
    }

    pub fn error(
        settings: AccelerationSettings,
        error: BenchmarkError,
        boottime_us: u64,
        wallclock_us: i64,
    ) -> Self {
        Self {
            request_id: None,
            settings,
            event_type: BenchmarkEventType::Error,
            result: None,
            error: Some(error),
            boottime_us,
            wallclock_us,
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.event_type == BenchmarkEventType::Error
    }

    /// Error code, if this is an error event.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

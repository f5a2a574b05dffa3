//! minibench core library
//!
//! Runs a batch of acceleration settings through a validation engine and
//! blocks until every one has a completion record or the batch deadline
//! passes.

pub mod clock;
pub mod engine;
pub mod fakes;
pub mod obs;
pub mod options;
pub mod request;
pub mod runner;
pub mod telemetry;

pub use clock::{Clock, SystemClock};
pub use engine::{
    CommandValidator, EngineError, EngineResult, LocalValidationEngine, SettingsValidator,
    ValidationContext, ValidationEngine, ValidatorFailure,
};
pub use options::{
    BenchmarkResultEvaluator, CustomInput, ModelFileDescriptor, ModelSource, RunnerConfig,
    ValidatorRunnerOptions, DEFAULT_PER_TEST_TIMEOUT,
};
pub use request::ValidationRequest;
pub use runner::poll::{Deadline, PollOutcome, POLL_INTERVAL};
pub use runner::{BlockingValidatorRunner, ValidationReport};
pub use telemetry::init_tracing;

pub use minibench_store::{
    AccelerationSettings, BenchmarkError, BenchmarkEvent, BenchmarkEventType, BenchmarkResult,
    BenchmarkStage, Delegate, ErrorCode, RequestId,
};

/// minibench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

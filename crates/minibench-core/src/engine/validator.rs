//! Per-settings validators.
//!
//! A [`SettingsValidator`] runs one settings value to completion. The local
//! engine wraps every call in its per-item timeout, so a validator never
//! needs its own.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use minibench_store::{
    AccelerationSettings, BenchmarkError, BenchmarkResult, BenchmarkStage, ErrorCode,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::error::{EngineError, EngineResult};
use crate::options::ModelSource;

/// Longest stderr excerpt kept on a failure record.
const STDERR_EXCERPT_BYTES: usize = 512;

/// Environment shared by every validation of one engine.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub model: Option<ModelSource>,
    pub data_directory: PathBuf,
    pub entrypoint: Option<String>,
    /// Directory holding `<i>.bin` custom input blobs, when supplied.
    pub custom_input_dir: Option<PathBuf>,
    pub custom_input_batch_size: Option<u32>,
}

/// Why a validation did not produce a result.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorFailure {
    pub stage: BenchmarkStage,
    pub code: ErrorCode,
    pub exit_code: Option<i32>,
    pub message: String,
}

impl ValidatorFailure {
    pub fn new(stage: BenchmarkStage, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            exit_code: None,
            message: message.into(),
        }
    }

    pub fn into_benchmark_error(self) -> BenchmarkError {
        BenchmarkError {
            stage: self.stage,
            code: self.code,
            exit_code: self.exit_code,
            message: (!self.message.is_empty()).then_some(self.message),
        }
    }
}

/// Runs a single settings validation.
#[async_trait]
pub trait SettingsValidator: Send + Sync + 'static {
    async fn validate(
        &self,
        settings: &AccelerationSettings,
        ctx: &ValidationContext,
    ) -> Result<BenchmarkResult, ValidatorFailure>;
}

/// Validates each settings value in its own child process.
///
/// The settings are written to the child's stdin as JSON. Exit status 0 is a
/// successful benchmark; stdout may carry `{"metrics": {"name": value}}`.
/// The child is killed if the validation future is dropped, which is how
/// the engine's timeout reaches it.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: Vec<String>,
}

impl CommandValidator {
    pub fn new(command: Vec<String>) -> EngineResult<Self> {
        if command.is_empty() || command[0].is_empty() {
            return Err(EngineError::InvalidConfig(
                "validator command must not be empty".into(),
            ));
        }
        Ok(Self { command })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn build(&self, ctx: &ValidationContext) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("MINIBENCH_DATA_DIR", &ctx.data_directory);
        if let Some(model) = &ctx.model {
            cmd.env("MINIBENCH_MODEL", model.token());
        }
        if let Some(entrypoint) = &ctx.entrypoint {
            cmd.env("MINIBENCH_ENTRYPOINT", entrypoint);
        }
        if let Some(dir) = &ctx.custom_input_dir {
            cmd.env("MINIBENCH_CUSTOM_INPUT_DIR", dir);
        }
        if let Some(batch_size) = ctx.custom_input_batch_size {
            cmd.env("MINIBENCH_CUSTOM_INPUT_BATCH_SIZE", batch_size.to_string());
        }
        cmd
    }
}

#[async_trait]
impl SettingsValidator for CommandValidator {
    async fn validate(
        &self,
        settings: &AccelerationSettings,
        ctx: &ValidationContext,
    ) -> Result<BenchmarkResult, ValidatorFailure> {
        let start = Instant::now();
        let payload = serde_json::to_vec(settings).map_err(|e| {
            ValidatorFailure::new(
                BenchmarkStage::Initialization,
                ErrorCode::PreconditionNotMet,
                e.to_string(),
            )
        })?;

        let mut child = self.build(ctx).spawn().map_err(|e| {
            ValidatorFailure::new(
                BenchmarkStage::Initialization,
                ErrorCode::ValidatorSpawnFailed,
                format!("{}: {e}", self.command[0]),
            )
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A validator that ignores stdin may exit before reading it.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "validator closed stdin early");
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            ValidatorFailure::new(
                BenchmarkStage::Inference,
                ErrorCode::ValidatorExited,
                e.to_string(),
            )
        })?;
        let duration_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        if output.status.success() {
            return Ok(BenchmarkResult {
                ok: true,
                duration_us,
                metrics: parse_metrics(&output.stdout),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ValidatorFailure {
            stage: BenchmarkStage::Inference,
            code: ErrorCode::ValidatorExited,
            exit_code: output.status.code(),
            message: excerpt(stderr.trim(), STDERR_EXCERPT_BYTES).to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ValidatorReport {
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

fn parse_metrics(stdout: &[u8]) -> BTreeMap<String, f64> {
    serde_json::from_slice::<ValidatorReport>(stdout)
        .map(|report| report.metrics)
        .unwrap_or_default()
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn excerpt(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

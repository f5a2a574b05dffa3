//! minibench - validate acceleration settings against a model
//!
//! ## Commands
//!
//! - `validate`: run one blocking validation batch through a validator command
//! - `results`: print the completion records currently in a store

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use minibench_core::{
    AccelerationSettings, BlockingValidatorRunner, CommandValidator, ModelFileDescriptor,
    ModelSource, RunnerConfig,
};
use minibench_store::{CompletionStore, FileCompletionStore};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "minibench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Blocking validation of acceleration settings", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a batch of settings and print one record per entry
    Validate(ValidateArgs),

    /// Print the records in a completion store
    Results {
        /// Completion store file
        #[arg(long, env = "MINIBENCH_STORAGE")]
        storage: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// JSON array of acceleration settings
    #[arg(short, long)]
    batch: PathBuf,

    /// Runner config file (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Completion store file, cleared at the start of the run
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Working directory handed to the validator
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Model file
    #[arg(long, conflicts_with = "model_fd")]
    model: Option<PathBuf>,

    /// Model inside an open descriptor, as fd:<fd>:<offset>:<size>
    #[arg(long, value_parser = parse_model_fd)]
    model_fd: Option<ModelFileDescriptor>,

    /// Timeout for a single settings validation
    #[arg(long)]
    per_test_timeout_ms: Option<u64>,

    /// Validations running at once
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Entry point name passed to the validator
    #[arg(long)]
    entrypoint: Option<String>,

    /// Print the full run report instead of just the records
    #[arg(long)]
    report: bool,

    /// Validator command; receives the settings as JSON on stdin
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

impl ValidateArgs {
    /// Config file (or defaults) with command-line overrides applied.
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::from_json_file(path)?,
            None => RunnerConfig::default(),
        };

        if let Some(storage) = &self.storage {
            config.storage_path = storage.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_directory_path = data_dir.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = Some(model.clone());
            config.model_fd = None;
        }
        if let Some(fd) = self.model_fd {
            config.model_path = None;
            config.model_fd = Some(fd);
        }
        if let Some(ms) = self.per_test_timeout_ms {
            config.per_test_timeout_ms = ms;
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(entrypoint) = &self.entrypoint {
            config.validation_entrypoint_name = Some(entrypoint.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_model_fd(s: &str) -> Result<ModelFileDescriptor, String> {
    match s.parse::<ModelSource>() {
        Ok(ModelSource::FileDescriptor(fd)) => Ok(fd),
        Ok(ModelSource::Path(_)) => Err(format!("expected fd:<fd>:<offset>:<size>, got {s}")),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    minibench_core::init_tracing(cli.json, level);

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Validate(args) => cmd_validate(args, &mut stdout),
        Commands::Results { storage } => cmd_results(&storage, &mut stdout),
    }
}

fn cmd_validate(args: ValidateArgs, out: &mut impl Write) -> Result<()> {
    let options = args.runner_config()?.into_options();
    let batch = load_batch(&args.batch)?;
    let validator = CommandValidator::new(args.command)?;

    let runner = BlockingValidatorRunner::new(&options, validator)
        .context("Failed to start validation engine")?;
    runner
        .initialize()
        .context("Validation engine initialization failed")?;

    let report = runner.trigger_validation_report(&batch);
    info!(
        records = report.records.len(),
        genuine = report.genuine,
        synthesized = report.synthesized,
        timed_out = report.timed_out(),
        "validation run complete"
    );

    if args.report {
        print_json(out, &report)
    } else {
        print_json(out, &report.records)
    }
}

fn cmd_results(storage: &Path, out: &mut impl Write) -> Result<()> {
    let records = FileCompletionStore::new(storage)
        .fetch_all()
        .with_context(|| format!("Failed to read {}", storage.display()))?;
    print_json(out, &records)
}

fn load_batch(path: &Path) -> Result<Vec<AccelerationSettings>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Batch file {} is not a JSON array of settings", path.display()))
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

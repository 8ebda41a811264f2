//! gpusched CLI
//!
//! Command-line interface for dispatching shell jobs across GPUs.

mod commands;

use clap::{Parser, Subcommand};
use gpusched_core::{GpuschedConfig, MinMemory, ProbeMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// gpusched - run a queue of shell jobs on whichever GPUs have room
#[derive(Parser, Debug)]
#[command(name = "gpusched")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Probe mode (memory or occupancy)
    #[arg(long, global = true)]
    probe_mode: Option<ProbeMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dispatch a queue of jobs and wait for them to finish
    Run {
        /// Commands to run, one job each
        jobs: Vec<String>,

        /// File with one command per line (`#` starts a comment)
        #[arg(long)]
        jobs_file: Option<PathBuf>,

        /// Seconds to wait before re-checking GPU availability
        #[arg(long)]
        wait_interval: Option<u64>,

        /// Comma-separated GPU indices the scheduler may use
        #[arg(long, value_delimiter = ',')]
        gpus: Option<Vec<u32>>,

        /// Maximum concurrent jobs on one GPU
        #[arg(long)]
        max_tasks_per_gpu: Option<u32>,

        /// Minimum free memory: an integer in MiB or a fraction of total
        #[arg(long)]
        min_memory: Option<MinMemory>,

        /// Exit with a failure status when any job fails
        #[arg(long)]
        fail_on_job_error: bool,
    },

    /// Show GPU information
    Gpus {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GpuschedConfig::from_file(path)?,
        None => GpuschedConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(mode) = cli.probe_mode {
        config.probe.mode = mode;
    }

    init_logging(&config.logging.level);

    match cli.command {
        Commands::Run {
            jobs,
            jobs_file,
            wait_interval,
            gpus,
            max_tasks_per_gpu,
            min_memory,
            fail_on_job_error,
        } => {
            if let Some(secs) = wait_interval {
                config.scheduler.wait_interval_secs = secs;
            }
            if let Some(gpus) = gpus {
                config.scheduler.allowed_gpu_ids = gpus;
            }
            if let Some(max) = max_tasks_per_gpu {
                config.scheduler.max_tasks_per_gpu = max;
            }
            if min_memory.is_some() {
                config.scheduler.min_memory = min_memory;
            }
            config.validate()?;

            let queue = commands::load_queue(jobs, jobs_file.as_deref())?;
            let summary = commands::run(&config, queue).await?;

            if fail_on_job_error && summary.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Gpus { json } => {
            config.validate()?;
            commands::gpus(&config, json).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

//! Process-based runtime implementation
//!
//! Each job runs as a shell process. The process inherits the scheduler's
//! environment and stdio, with one extra variable restricting it to the
//! assigned GPU.

use async_trait::async_trait;
use gpusched_core::{GpuschedError, GpuschedResult, Job, JobOutcome, RuntimeConfig};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

use crate::traits::Runtime;

/// Process-based runtime for running shell jobs
pub struct ProcessRuntime {
    config: RuntimeConfig,
}

impl ProcessRuntime {
    /// Create a new process runtime
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Build the command to run a job on a GPU
    fn build_command(&self, job: &Job, gpu_id: u32) -> Command {
        let mut cmd = match &self.config.shell {
            Some(shell) => {
                let mut cmd = Command::new(shell);
                cmd.arg("-c");
                cmd
            }
            None => default_shell(),
        };
        cmd.arg(&job.command);

        cmd.env(&self.config.visibility_env, gpu_id.to_string());

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        cmd
    }
}

#[cfg(unix)]
fn default_shell() -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c");
    cmd
}

#[cfg(windows)]
fn default_shell() -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C");
    cmd
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn run_job(&self, job: &Job, gpu_id: u32) -> GpuschedResult<JobOutcome> {
        let mut child = self.build_command(job, gpu_id).spawn().map_err(|e| {
            error!(gpu = gpu_id, command = %job, error = %e, "Failed to spawn job process");
            GpuschedError::Runtime(format!("Failed to spawn job: {}", e))
        })?;

        let pid = child.id().unwrap_or(0);
        debug!(gpu = gpu_id, pid = pid, "Job process spawned");

        let status = child
            .wait()
            .await
            .map_err(|e| GpuschedError::Runtime(format!("Failed to wait for job: {}", e)))?;

        if status.success() {
            Ok(JobOutcome::Succeeded)
        } else {
            Ok(JobOutcome::Failed {
                exit_code: status.code(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

//! Runtime trait definitions

use async_trait::async_trait;
use gpusched_core::{GpuschedResult, Job, JobOutcome};

/// Runtime trait for executing jobs
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run a job restricted to `gpu_id` and wait for it to exit.
    ///
    /// A job exiting with a failure status is an `Ok` outcome; `Err` means
    /// the job could not be run at all.
    async fn run_job(&self, job: &Job, gpu_id: u32) -> GpuschedResult<JobOutcome>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}

//! Launching jobs on their assigned GPU

use futures::future::join_all;
use gpusched_core::{GpuschedResult, Job, JobOutcome};
use gpusched_runtime::Runtime;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::task_table::TaskTable;

/// A job handed to the runtime
#[derive(Debug)]
pub struct DispatchedJob {
    /// Identifier used in log lines
    pub id: Uuid,
    /// Position in the submitted queue
    pub index: usize,
    /// GPU the job is bound to
    pub gpu_id: u32,
    /// The job's command line
    pub command: String,
    /// Resolves when the job exits
    pub handle: JoinHandle<JobOutcome>,
}

/// Totals after draining dispatched jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs that exited successfully
    pub succeeded: usize,
    /// Jobs that failed, could not launch, or panicked
    pub failed: usize,
}

impl RunSummary {
    /// Number of jobs drained
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Starts jobs as independent tasks and keeps the task table in step
pub struct Dispatcher {
    runtime: Arc<dyn Runtime>,
    tasks: Arc<TaskTable>,
    max_tasks_per_gpu: u32,
}

impl Dispatcher {
    /// Create a dispatcher over a shared task table
    pub fn new(runtime: Arc<dyn Runtime>, tasks: Arc<TaskTable>, max_tasks_per_gpu: u32) -> Self {
        Self {
            runtime,
            tasks,
            max_tasks_per_gpu,
        }
    }

    /// Count the job against `gpu_id` and start it without waiting for it.
    ///
    /// The count is taken before this returns and released when the job's
    /// task ends, whatever the outcome. Must be called inside a tokio runtime.
    pub fn dispatch(&self, index: usize, gpu_id: u32, job: &Job) -> GpuschedResult<DispatchedJob> {
        let slot = self.tasks.acquire(gpu_id, self.max_tasks_per_gpu)?;
        let id = Uuid::new_v4();

        info!(
            job_id = %id,
            index = index,
            gpu = gpu_id,
            runtime = self.runtime.name(),
            command = %job,
            "Dispatching job"
        );

        let runtime = Arc::clone(&self.runtime);
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            let _slot = slot;
            let outcome = match runtime.run_job(&task_job, gpu_id).await {
                Ok(outcome) => outcome,
                Err(e) => JobOutcome::LaunchFailed(e.to_string()),
            };

            if outcome.is_success() {
                info!(job_id = %id, gpu = gpu_id, "Job finished");
            } else {
                warn!(
                    job_id = %id,
                    gpu = gpu_id,
                    command = %task_job,
                    outcome = %outcome,
                    "Job failed"
                );
            }
            outcome
        });

        Ok(DispatchedJob {
            id,
            index,
            gpu_id,
            command: job.command.clone(),
            handle,
        })
    }
}

/// Wait for every dispatched job to exit
pub async fn drain(jobs: Vec<DispatchedJob>) -> RunSummary {
    let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
    let results = join_all(jobs.into_iter().map(|j| j.handle)).await;

    let mut summary = RunSummary::default();
    for (id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(outcome) if outcome.is_success() => summary.succeeded += 1,
            Ok(_) => summary.failed += 1,
            Err(e) => {
                error!(job_id = %id, error = %e, "Job task aborted");
                summary.failed += 1;
            }
        }
    }
    summary
}

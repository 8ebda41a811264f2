//! Per-GPU accounting of running jobs

use gpusched_core::{GpuschedError, GpuschedResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Running job count per GPU index
pub type TaskCounts = HashMap<u32, u32>;

/// Counts of in-flight jobs per GPU.
///
/// Every read that gates a scheduling decision and every increment or
/// decrement goes through the same lock. Entries are created on first use
/// and never removed.
#[derive(Debug, Default)]
pub struct TaskTable {
    counts: Mutex<TaskCounts>,
}

impl TaskTable {
    /// Create an empty table
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Running jobs on one GPU
    pub fn count(&self, gpu_id: u32) -> u32 {
        self.counts.lock().get(&gpu_id).copied().unwrap_or(0)
    }

    /// Running jobs across all GPUs
    pub fn total(&self) -> u32 {
        self.counts.lock().values().sum()
    }

    /// Copy of the current counts
    pub fn snapshot(&self) -> TaskCounts {
        self.counts.lock().clone()
    }

    /// Run `f` with the counts locked
    pub fn with_counts<R>(&self, f: impl FnOnce(&TaskCounts) -> R) -> R {
        f(&self.counts.lock())
    }

    /// Record a job starting on `gpu_id`.
    ///
    /// Fails without changing the table when the GPU already runs `max_tasks`
    /// jobs. The returned slot releases the count when dropped.
    pub fn acquire(self: &Arc<Self>, gpu_id: u32, max_tasks: u32) -> GpuschedResult<TaskSlot> {
        let mut counts = self.counts.lock();
        let count = counts.entry(gpu_id).or_insert(0);
        if *count >= max_tasks {
            return Err(GpuschedError::ResourceExhausted(format!(
                "GPU {} already runs {} of {} allowed tasks",
                gpu_id, count, max_tasks
            )));
        }
        *count += 1;
        debug!(gpu = gpu_id, running = *count, "Task slot acquired");

        Ok(TaskSlot {
            table: Arc::clone(self),
            gpu_id,
        })
    }

    fn release(&self, gpu_id: u32) {
        let mut counts = self.counts.lock();
        match counts.get_mut(&gpu_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                debug!(gpu = gpu_id, running = *count, "Task slot released");
            }
            _ => error!(gpu = gpu_id, "Released a task slot that was never acquired"),
        }
    }
}

/// One job's claim on a GPU, released exactly once on drop
#[derive(Debug)]
pub struct TaskSlot {
    table: Arc<TaskTable>,
    gpu_id: u32,
}

impl TaskSlot {
    /// GPU this slot counts against
    pub fn gpu_id(&self) -> u32 {
        self.gpu_id
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.table.release(self.gpu_id);
    }
}

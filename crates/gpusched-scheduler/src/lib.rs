//! gpusched-scheduler: GPU-aware job scheduler for gpusched
//!
//! This crate provides the scheduling logic for feeding a job queue onto GPUs:
//! - Per-GPU accounting of running jobs
//! - GPU selection decisions
//! - Job dispatch and the scheduling loop

pub mod dispatcher;
pub mod scheduler;
pub mod selector;
pub mod task_table;

#[cfg(test)]
mod testing;

pub use dispatcher::{drain, DispatchedJob, Dispatcher, RunSummary};
pub use scheduler::Scheduler;
pub use selector::{FirstFit, SelectionContext, SelectionStrategy};
pub use task_table::{TaskCounts, TaskSlot, TaskTable};

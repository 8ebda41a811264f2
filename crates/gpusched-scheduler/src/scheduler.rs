//! Main scheduler logic

use gpusched_core::{DeviceProbe, GpuschedResult, Job, SchedulerConfig};
use gpusched_runtime::Runtime;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatcher::{self, DispatchedJob, Dispatcher, RunSummary};
use crate::selector::{FirstFit, SelectionContext, SelectionStrategy};
use crate::task_table::{TaskCounts, TaskTable};

/// Scheduler feeding a job queue onto GPUs as they gain room
pub struct Scheduler {
    /// Immutable settings
    config: SchedulerConfig,
    /// Device inventory source
    probe: Arc<dyn DeviceProbe>,
    /// Selection strategy
    strategy: Arc<dyn SelectionStrategy>,
    /// Running jobs per GPU
    tasks: Arc<TaskTable>,
    /// Job launcher
    dispatcher: Dispatcher,
}

impl Scheduler {
    /// Create a new scheduler, rejecting invalid configuration
    pub fn new(
        config: SchedulerConfig,
        probe: Arc<dyn DeviceProbe>,
        runtime: Arc<dyn Runtime>,
    ) -> GpuschedResult<Self> {
        config.validate()?;

        let tasks = TaskTable::new();
        let dispatcher = Dispatcher::new(runtime, Arc::clone(&tasks), config.max_tasks_per_gpu);

        info!(
            probe = probe.name(),
            mode = %probe.mode(),
            wait_interval_secs = config.wait_interval_secs,
            allowed_gpus = ?config.allowed_gpu_ids,
            max_tasks_per_gpu = config.max_tasks_per_gpu,
            "Scheduler initialized"
        );

        Ok(Self {
            config,
            probe,
            strategy: Arc::new(FirstFit),
            tasks,
            dispatcher,
        })
    }

    /// Replace the selection strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Scheduler settings
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Copy of the running job counts
    pub fn running_tasks(&self) -> TaskCounts {
        self.tasks.snapshot()
    }

    /// Probe once and pick a GPU that can take another job.
    ///
    /// A failed probe counts as no GPU available this round.
    pub async fn select_device(&self) -> Option<u32> {
        let devices = match self.probe.probe().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(probe = self.probe.name(), error = %e, "Error checking GPU status");
                return None;
            }
        };

        self.tasks.with_counts(|counts| {
            let ctx = SelectionContext {
                config: &self.config,
                mode: self.probe.mode(),
                counts,
            };
            self.strategy.select(&devices, &ctx)
        })
    }

    /// Start `job` on `gpu_id` without waiting for it
    pub fn dispatch(&self, index: usize, gpu_id: u32, job: &Job) -> GpuschedResult<DispatchedJob> {
        self.dispatcher.dispatch(index, gpu_id, job)
    }

    /// Hand every job to a GPU, in queue order.
    ///
    /// Returns once the last job is dispatched; running jobs are not awaited.
    /// While no GPU is eligible the loop sleeps for the wait interval and
    /// retries the same job.
    pub async fn run_jobs(&self, jobs: Vec<Job>) -> Vec<DispatchedJob> {
        let total = jobs.len();
        let mut dispatched = Vec::with_capacity(total);

        for (index, job) in jobs.into_iter().enumerate() {
            loop {
                if let Some(gpu_id) = self.select_device().await {
                    match self.dispatch(index, gpu_id, &job) {
                        Ok(handle) => {
                            debug!(index = index, gpu = gpu_id, "Found available GPU");
                            dispatched.push(handle);
                            break;
                        }
                        Err(e) => warn!(gpu = gpu_id, error = %e, "Dispatch refused"),
                    }
                } else {
                    debug!(
                        index = index,
                        wait_secs = self.config.wait_interval_secs,
                        "No available GPU or max task limit reached. Waiting"
                    );
                }
                tokio::time::sleep(self.config.wait_interval()).await;
            }
        }

        info!(jobs = total, "All jobs dispatched");
        dispatched
    }

    /// Dispatch every job, then wait for all of them to exit
    pub async fn run_to_completion(&self, jobs: Vec<Job>) -> RunSummary {
        let dispatched = self.run_jobs(jobs).await;
        let summary = dispatcher::drain(dispatched).await;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "All jobs finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProbe, ScriptedRuntime};
    use gpusched_core::{DeviceStatus, GpuschedError, JobOutcome, MinMemory, ProbeMode};
    use std::time::Duration;
    use tokio::time::Instant;

    fn jobs(commands: &[&str]) -> Vec<Job> {
        commands.iter().map(|c| Job::new(*c)).collect()
    }

    fn config(allowed: Vec<u32>, max_tasks: u32) -> SchedulerConfig {
        SchedulerConfig {
            wait_interval_secs: 5,
            allowed_gpu_ids: allowed,
            max_tasks_per_gpu: max_tasks,
            min_memory: None,
        }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let probe = ScriptedProbe::fixed(ProbeMode::Occupancy, vec![]);
        let runtime = ScriptedRuntime::immediate();
        let result = Scheduler::new(config(vec![1, 1], 1), probe, runtime);
        assert!(matches!(result, Err(GpuschedError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_dispatched_in_order_to_single_device() {
        let probe = ScriptedProbe::fixed(ProbeMode::Occupancy, vec![DeviceStatus::idle(0)]);
        let runtime = ScriptedRuntime::immediate();
        let scheduler = Scheduler::new(config(vec![], 1), probe, runtime.clone()).unwrap();

        let dispatched = scheduler.run_jobs(jobs(&["a", "b", "c", "d"])).await;

        let order: Vec<(usize, u32, &str)> = dispatched
            .iter()
            .map(|d| (d.index, d.gpu_id, d.command.as_str()))
            .collect();
        assert_eq!(order, vec![(0, 0, "a"), (1, 0, "b"), (2, 0, "c"), (3, 0, "d")]);

        let summary = dispatcher::drain(dispatched).await;
        assert_eq!(summary.succeeded, 4);
        assert_eq!(runtime.launches().len(), 4);
        assert_eq!(runtime.peak(0), 1);
        assert_eq!(scheduler.running_tasks().get(&0), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_capacity_dispatches_without_waiting() {
        let probe = ScriptedProbe::fixed(
            ProbeMode::Occupancy,
            vec![DeviceStatus::idle(0), DeviceStatus::idle(1)],
        );
        let runtime = ScriptedRuntime::held();
        let scheduler = Scheduler::new(config(vec![0, 1], 2), probe.clone(), runtime.clone())
            .unwrap();

        let start = Instant::now();
        let dispatched = scheduler.run_jobs(jobs(&["j0", "j1", "j2", "j3"])).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(probe.calls(), 4);

        let gpus: Vec<u32> = dispatched.iter().map(|d| d.gpu_id).collect();
        assert_eq!(gpus, vec![0, 0, 1, 1]);
        let running = scheduler.running_tasks();
        assert_eq!(running.get(&0), Some(&2));
        assert_eq!(running.get(&1), Some(&2));

        runtime.release_all();
        let summary = dispatcher::drain(dispatched).await;
        assert_eq!(summary.total(), 4);
        assert!(scheduler.running_tasks().values().all(|&c| c == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_memory_frees_up() {
        let low = vec![DeviceStatus::with_memory(0, 1000, 10000)];
        let high = vec![DeviceStatus::with_memory(0, 9000, 10000)];
        let probe = ScriptedProbe::new(
            ProbeMode::Memory,
            vec![Some(low.clone()), Some(low.clone()), Some(low), Some(high)],
        );
        let runtime = ScriptedRuntime::immediate();
        let mut cfg = config(vec![], 1);
        cfg.min_memory = Some(MinMemory::Fraction(0.5));
        let scheduler = Scheduler::new(cfg, probe.clone(), runtime.clone()).unwrap();

        let start = Instant::now();
        let dispatched = scheduler.run_jobs(jobs(&["first", "second"])).await;

        assert!(start.elapsed() >= Duration::from_secs(3 * 5));
        assert!(probe.calls() >= 4);
        assert_eq!(dispatched.len(), 2);
        assert!(dispatched.iter().all(|d| d.gpu_id == 0));

        dispatcher::drain(dispatched).await;
        assert_eq!(runtime.launches().len(), 2);
        assert_eq!(scheduler.running_tasks().get(&0), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_is_retried() {
        let probe = ScriptedProbe::new(
            ProbeMode::Occupancy,
            vec![None, None, Some(vec![DeviceStatus::idle(0)])],
        );
        let runtime = ScriptedRuntime::immediate();
        let scheduler = Scheduler::new(config(vec![], 1), probe.clone(), runtime).unwrap();

        assert_eq!(scheduler.select_device().await, None);

        let start = Instant::now();
        let dispatched = scheduler.run_jobs(jobs(&["only"])).await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(dispatched[0].gpu_id, 0);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_list_is_respected() {
        let probe = ScriptedProbe::fixed(
            ProbeMode::Occupancy,
            vec![
                DeviceStatus::idle(0),
                DeviceStatus::idle(1),
                DeviceStatus::idle(2),
            ],
        );
        let runtime = ScriptedRuntime::timed(Duration::from_secs(7));
        let scheduler = Scheduler::new(config(vec![2], 1), probe, runtime.clone()).unwrap();

        let summary = scheduler.run_to_completion(jobs(&["a", "b", "c"])).await;

        assert_eq!(summary.succeeded, 3);
        assert!(runtime.launches().iter().all(|(gpu, _)| *gpu == 2));
        assert_eq!(runtime.peak(2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_holds_under_load() {
        let probe = ScriptedProbe::fixed(
            ProbeMode::Occupancy,
            vec![DeviceStatus::idle(0), DeviceStatus::idle(1)],
        );
        let runtime = ScriptedRuntime::timed(Duration::from_secs(12));
        let scheduler = Scheduler::new(config(vec![], 2), probe, runtime.clone()).unwrap();

        let commands: Vec<String> = (0..12).map(|i| format!("job-{}", i)).collect();
        let queue: Vec<Job> = commands.iter().map(Job::new).collect();
        let summary = scheduler.run_to_completion(queue).await;

        assert_eq!(summary.succeeded, 12);
        assert!(runtime.peak(0) <= 2);
        assert!(runtime.peak(1) <= 2);
        assert_eq!(scheduler.running_tasks().values().sum::<u32>(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_queue() {
        let probe = ScriptedProbe::fixed(ProbeMode::Occupancy, vec![DeviceStatus::idle(0)]);
        let runtime = ScriptedRuntime::immediate();
        runtime.fail_command("bad", JobOutcome::Failed { exit_code: Some(2) });
        runtime.error_command("unlaunchable");
        let scheduler = Scheduler::new(config(vec![], 1), probe, runtime.clone()).unwrap();

        let summary = scheduler
            .run_to_completion(jobs(&["bad", "good", "unlaunchable", "good"]))
            .await;

        assert_eq!(
            summary,
            RunSummary {
                succeeded: 2,
                failed: 2
            }
        );
        assert_eq!(runtime.launches().len(), 4);
        assert_eq!(scheduler.running_tasks().get(&0), Some(&0));
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let probe = ScriptedProbe::fixed(ProbeMode::Occupancy, vec![]);
        let runtime = ScriptedRuntime::immediate();
        let scheduler = Scheduler::new(config(vec![], 1), probe.clone(), runtime).unwrap();

        assert!(scheduler.run_jobs(Vec::new()).await.is_empty());
        assert_eq!(probe.calls(), 0);
    }
}

//! CLI commands implementation

use anyhow::{bail, Context, Result};
use gpusched_core::{build_probe, GpuInfo, GpuschedConfig, Job, ProbeMode};
use gpusched_runtime::ProcessRuntime;
use gpusched_scheduler::{RunSummary, Scheduler, SelectionContext, TaskCounts};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Build the job queue from positional commands followed by a jobs file
pub fn load_queue(commands: Vec<String>, jobs_file: Option<&Path>) -> Result<Vec<Job>> {
    let mut queue: Vec<Job> = commands.into_iter().map(Job::new).collect();

    if let Some(path) = jobs_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read jobs file {}", path.display()))?;
        queue.extend(Job::parse_queue(&text));
    }

    if queue.is_empty() {
        bail!("No jobs given; pass commands or --jobs-file");
    }
    Ok(queue)
}

/// Dispatch the queue and wait for every job to finish
pub async fn run(config: &GpuschedConfig, queue: Vec<Job>) -> Result<RunSummary> {
    let probe = build_probe(&config.probe)?;
    let runtime = Arc::new(ProcessRuntime::new(config.runtime.clone()));
    let scheduler = Scheduler::new(config.scheduler.clone(), probe, runtime)?;

    info!(jobs = queue.len(), "Scheduling jobs");
    let summary = scheduler.run_to_completion(queue).await;

    println!(
        "Jobs: {} total, {} succeeded, {} failed",
        summary.total(),
        summary.succeeded,
        summary.failed
    );
    Ok(summary)
}

/// Show one probe snapshot and which GPUs could take a job right now
pub async fn gpus(config: &GpuschedConfig, json: bool) -> Result<()> {
    let probe = build_probe(&config.probe)?;
    let devices = probe
        .probe()
        .await
        .context("Failed to get GPU info")?;
    let gpu_info = GpuInfo::from_devices(devices);

    if json {
        println!("{}", serde_json::to_string_pretty(&gpu_info)?);
        return Ok(());
    }

    println!(
        "GPUs: {} total, {} idle ({} probe, {} mode)",
        gpu_info.total_count,
        gpu_info.idle_count,
        probe.name(),
        probe.mode()
    );

    if gpu_info.devices.is_empty() {
        return Ok(());
    }

    let counts = TaskCounts::new();
    let ctx = SelectionContext {
        config: &config.scheduler,
        mode: probe.mode(),
        counts: &counts,
    };

    println!();
    for device in &gpu_info.devices {
        let memory = match device.memory {
            Some(m) => format!("{}/{} MiB free", m.free_mib, m.total_mib),
            None => "memory n/a".to_string(),
        };
        println!(
            "[{}] {} - {} - {} - {}",
            device.index,
            device.uuid.as_deref().unwrap_or("-"),
            memory,
            if device.busy { "Busy" } else { "Idle" },
            if ctx.is_eligible(device) {
                "Eligible"
            } else {
                "Not eligible"
            }
        );
    }

    if probe.mode() == ProbeMode::Memory {
        println!();
        println!(
            "Memory threshold: {}",
            config.scheduler.memory_threshold()
        );
    }

    Ok(())
}

//! GPU selection decisions

use gpusched_core::{DeviceStatus, ProbeMode, SchedulerConfig};

use crate::task_table::TaskCounts;

/// Everything a selection round looks at besides the probe snapshot
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Scheduler settings (allow-list, cap, memory threshold)
    pub config: &'a SchedulerConfig,
    /// Query shape the snapshot came from
    pub mode: ProbeMode,
    /// Running jobs per GPU, read under the task table lock
    pub counts: &'a TaskCounts,
}

impl SelectionContext<'_> {
    fn running(&self, gpu_id: u32) -> u32 {
        self.counts.get(&gpu_id).copied().unwrap_or(0)
    }

    /// Whether a device may take one more job
    pub fn is_eligible(&self, device: &DeviceStatus) -> bool {
        let running = self.running(device.index);
        self.config.is_allowed(device.index)
            && running < self.config.max_tasks_per_gpu
            && self.has_free_capacity(device, running)
    }

    fn has_free_capacity(&self, device: &DeviceStatus, running: u32) -> bool {
        match self.mode {
            // A device hosting foreign processes stays usable while under the
            // cap, so several jobs can share one GPU.
            ProbeMode::Occupancy => !device.busy || running < self.config.max_tasks_per_gpu,
            ProbeMode::Memory => device
                .memory
                .as_ref()
                .is_some_and(|memory| self.config.memory_threshold().is_met_by(memory)),
        }
    }
}

/// Strategy for choosing a GPU from a probe snapshot
pub trait SelectionStrategy: Send + Sync {
    /// Pick one eligible GPU, or `None` when nothing has room
    fn select(&self, devices: &[DeviceStatus], ctx: &SelectionContext<'_>) -> Option<u32>;
}

/// First eligible device in probe order (ascending index)
pub struct FirstFit;

impl SelectionStrategy for FirstFit {
    fn select(&self, devices: &[DeviceStatus], ctx: &SelectionContext<'_>) -> Option<u32> {
        devices
            .iter()
            .find(|device| ctx.is_eligible(device))
            .map(|device| device.index)
    }
}

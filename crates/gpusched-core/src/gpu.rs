//! GPU device snapshots reported by a probe

use serde::{Deserialize, Serialize};

/// Free and total memory of a device, in MiB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Free memory in MiB
    pub free_mib: u64,
    /// Total memory in MiB
    pub total_mib: u64,
}

/// State of one GPU as observed by a single probe round.
///
/// Snapshots are never mutated; the next round produces fresh values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Device index
    pub index: u32,
    /// Device UUID, when the probe reports one
    pub uuid: Option<String>,
    /// Whether any compute process is currently running on the device
    pub busy: bool,
    /// Memory figures, when the probe reports them
    pub memory: Option<MemoryInfo>,
}

impl DeviceStatus {
    /// A device with no running compute process and no memory figures
    pub fn idle(index: u32) -> Self {
        Self {
            index,
            uuid: None,
            busy: false,
            memory: None,
        }
    }

    /// A device known only by its memory figures
    pub fn with_memory(index: u32, free_mib: u64, total_mib: u64) -> Self {
        Self {
            index,
            uuid: None,
            busy: false,
            memory: Some(MemoryInfo {
                free_mib,
                total_mib,
            }),
        }
    }
}

/// GPU information for the system
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuInfo {
    /// Devices in ascending index order
    pub devices: Vec<DeviceStatus>,
    /// Total number of GPUs
    pub total_count: u32,
    /// Number of GPUs with no running compute process
    pub idle_count: u32,
}

impl GpuInfo {
    /// Create empty GPU info (no GPUs detected)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Summarize a probe snapshot
    pub fn from_devices(mut devices: Vec<DeviceStatus>) -> Self {
        devices.sort_by_key(|d| d.index);
        let total_count = devices.len() as u32;
        let idle_count = devices.iter().filter(|d| !d.busy).count() as u32;
        Self {
            devices,
            total_count,
            idle_count,
        }
    }

    /// Indices of devices with no running compute process
    pub fn idle_indices(&self) -> Vec<u32> {
        self.devices
            .iter()
            .filter(|d| !d.busy)
            .map(|d| d.index)
            .collect()
    }
}

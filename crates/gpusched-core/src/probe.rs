//! Device inventory probes
//!
//! A probe reports one snapshot of the host's GPUs per call. Implementations:
//! - `NvidiaSmiProbe` parses the CSV output of `nvidia-smi`
//! - `NvmlProbe` talks to the driver directly (feature `nvml`)
//! - `StaticProbe` returns a fixed snapshot

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ProbeBackend, ProbeConfig, ProbeMode};
use crate::gpu::DeviceStatus;
use crate::{GpuschedError, GpuschedResult};

/// Source of device snapshots
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Query the current device state, sorted by ascending index.
    ///
    /// An error means no usable information this round.
    async fn probe(&self) -> GpuschedResult<Vec<DeviceStatus>>;

    /// Query shape this probe answers
    fn mode(&self) -> ProbeMode;

    /// Get the probe name
    fn name(&self) -> &'static str;
}

/// Build the probe described by the configuration
pub fn build_probe(config: &ProbeConfig) -> GpuschedResult<Arc<dyn DeviceProbe>> {
    match config.backend {
        ProbeBackend::NvidiaSmi => Ok(Arc::new(NvidiaSmiProbe::new(
            config.nvidia_smi_path.clone(),
            config.mode,
        ))),
        #[cfg(feature = "nvml")]
        ProbeBackend::Nvml => Ok(Arc::new(nvml::NvmlProbe::new(config.mode)?)),
        #[cfg(not(feature = "nvml"))]
        ProbeBackend::Nvml => Err(GpuschedError::Config(
            "probe backend \"nvml\" requires building with the `nvml` feature".to_string(),
        )),
    }
}

const MEMORY_QUERY: &[&str] = &[
    "--query-gpu=index,memory.free,memory.total",
    "--format=csv,noheader,nounits",
];
const COMPUTE_APPS_QUERY: &[&str] = &["--query-compute-apps=gpu_uuid", "--format=csv,noheader"];
const UUID_QUERY: &[&str] = &["--query-gpu=index,uuid", "--format=csv,noheader"];

/// Probe backed by the `nvidia-smi` command line tool
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    path: PathBuf,
    mode: ProbeMode,
}

impl NvidiaSmiProbe {
    /// Create a probe running the binary at `path`
    pub fn new(path: impl Into<PathBuf>, mode: ProbeMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    async fn query(&self, args: &[&str]) -> GpuschedResult<String> {
        let output = Command::new(&self.path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                GpuschedError::Probe(format!("Failed to run {}: {}", self.path.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GpuschedError::Probe(format!(
                "{} exited with {}: {}",
                self.path.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DeviceProbe for NvidiaSmiProbe {
    async fn probe(&self) -> GpuschedResult<Vec<DeviceStatus>> {
        let devices = match self.mode {
            ProbeMode::Memory => parse_memory_csv(&self.query(MEMORY_QUERY).await?),
            ProbeMode::Occupancy => {
                let apps = self.query(COMPUTE_APPS_QUERY).await?;
                let uuids = self.query(UUID_QUERY).await?;
                parse_occupancy_csv(&apps, &uuids)
            }
        };
        debug!(devices = devices.len(), mode = %self.mode, "nvidia-smi probe complete");
        Ok(devices)
    }

    fn mode(&self) -> ProbeMode {
        self.mode
    }

    fn name(&self) -> &'static str {
        "nvidia-smi"
    }
}

/// Parse `index, memory.free, memory.total` rows (MiB, no header, no units)
pub fn parse_memory_csv(text: &str) -> Vec<DeviceStatus> {
    let mut devices: Vec<DeviceStatus> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let device = parse_memory_row(line);
            if device.is_none() {
                warn!(line = line, "Skipping malformed memory row");
            }
            device
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    devices
}

fn parse_memory_row(line: &str) -> Option<DeviceStatus> {
    let mut fields = line.split(',').map(str::trim);
    let index = fields.next()?.parse().ok()?;
    let free = fields.next()?.parse().ok()?;
    let total = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(DeviceStatus::with_memory(index, free, total))
}

/// Join busy GPU UUIDs (one per compute process) with `index, uuid` rows
pub fn parse_occupancy_csv(compute_apps: &str, index_uuid: &str) -> Vec<DeviceStatus> {
    let busy: HashSet<&str> = compute_apps
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut devices: Vec<DeviceStatus> = index_uuid
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let Some((index, uuid)) = line.split_once(',') else {
                warn!(line = line, "Skipping malformed uuid row");
                return None;
            };
            let Ok(index) = index.trim().parse::<u32>() else {
                warn!(line = line, "Skipping malformed uuid row");
                return None;
            };
            let uuid = uuid.trim();
            Some(DeviceStatus {
                index,
                uuid: Some(uuid.to_string()),
                busy: busy.contains(uuid),
                memory: None,
            })
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    devices
}

/// Probe returning the same snapshot on every call
#[derive(Debug, Clone)]
pub struct StaticProbe {
    devices: Vec<DeviceStatus>,
    mode: ProbeMode,
}

impl StaticProbe {
    /// Create a probe over a fixed set of devices
    pub fn new(mut devices: Vec<DeviceStatus>, mode: ProbeMode) -> Self {
        devices.sort_by_key(|d| d.index);
        Self { devices, mode }
    }
}

#[async_trait]
impl DeviceProbe for StaticProbe {
    async fn probe(&self) -> GpuschedResult<Vec<DeviceStatus>> {
        Ok(self.devices.clone())
    }

    fn mode(&self) -> ProbeMode {
        self.mode
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(feature = "nvml")]
mod nvml {
    use super::*;
    use crate::gpu::MemoryInfo;
    use nvml_wrapper::Nvml;

    const MIB: u64 = 1024 * 1024;

    /// Probe backed by the NVIDIA Management Library
    pub struct NvmlProbe {
        nvml: Nvml,
        mode: ProbeMode,
    }

    impl NvmlProbe {
        /// Initialize NVML
        pub fn new(mode: ProbeMode) -> GpuschedResult<Self> {
            let nvml = Nvml::init()
                .map_err(|e| GpuschedError::Probe(format!("Failed to initialize NVML: {}", e)))?;
            Ok(Self { nvml, mode })
        }
    }

    #[async_trait]
    impl DeviceProbe for NvmlProbe {
        async fn probe(&self) -> GpuschedResult<Vec<DeviceStatus>> {
            let count = self
                .nvml
                .device_count()
                .map_err(|e| GpuschedError::Probe(e.to_string()))?;

            let mut devices = Vec::with_capacity(count as usize);
            for index in 0..count {
                let device = self
                    .nvml
                    .device_by_index(index)
                    .map_err(|e| GpuschedError::Probe(e.to_string()))?;
                let memory = device.memory_info().ok().map(|m| MemoryInfo {
                    free_mib: m.free / MIB,
                    total_mib: m.total / MIB,
                });
                let busy = device
                    .running_compute_processes()
                    .map(|procs| !procs.is_empty())
                    .unwrap_or(false);
                devices.push(DeviceStatus {
                    index,
                    uuid: device.uuid().ok(),
                    busy,
                    memory,
                });
            }
            Ok(devices)
        }

        fn mode(&self) -> ProbeMode {
            self.mode
        }

        fn name(&self) -> &'static str {
            "nvml"
        }
    }
}

#[cfg(feature = "nvml")]
pub use nvml::NvmlProbe;

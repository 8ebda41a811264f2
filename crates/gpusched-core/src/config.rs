//! Configuration types for gpusched

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::gpu::MemoryInfo;
use crate::{GpuschedError, GpuschedResult};

/// Fraction of total memory required when memory mode has no explicit threshold
pub const DEFAULT_MIN_MEMORY_FRACTION: f64 = 0.8;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuschedConfig {
    /// Scheduling loop configuration
    pub scheduler: SchedulerConfig,
    /// Device probe configuration
    pub probe: ProbeConfig,
    /// Job runtime configuration
    pub runtime: RuntimeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl GpuschedConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> GpuschedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GpuschedError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> GpuschedResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GpuschedError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> GpuschedResult<()> {
        self.scheduler.validate()?;
        self.runtime.validate()
    }
}

/// Scheduling loop configuration. Immutable once a scheduler is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds to wait before probing again when no device is eligible
    pub wait_interval_secs: u64,
    /// Devices the scheduler may select; empty means all
    pub allowed_gpu_ids: Vec<u32>,
    /// Maximum number of concurrently running jobs per device
    pub max_tasks_per_gpu: u32,
    /// Free memory a device needs in memory mode
    pub min_memory: Option<MinMemory>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_interval_secs: 30,
            allowed_gpu_ids: Vec::new(),
            max_tasks_per_gpu: 1,
            min_memory: None,
        }
    }
}

impl SchedulerConfig {
    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> GpuschedResult<()> {
        if self.wait_interval_secs == 0 {
            return Err(GpuschedError::Config(
                "wait_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.max_tasks_per_gpu == 0 {
            return Err(GpuschedError::Config(
                "max_tasks_per_gpu must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for id in &self.allowed_gpu_ids {
            if !seen.insert(*id) {
                return Err(GpuschedError::Config(format!(
                    "allowed_gpu_ids lists GPU {} more than once",
                    id
                )));
            }
        }

        if let Some(min_memory) = self.min_memory {
            min_memory.validate()?;
        }

        Ok(())
    }

    /// Interval between probe rounds while nothing is eligible
    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    /// Whether the allow-list admits a device
    pub fn is_allowed(&self, gpu_id: u32) -> bool {
        self.allowed_gpu_ids.is_empty() || self.allowed_gpu_ids.contains(&gpu_id)
    }

    /// Threshold applied in memory mode
    pub fn memory_threshold(&self) -> MinMemory {
        self.min_memory
            .unwrap_or(MinMemory::Fraction(DEFAULT_MIN_MEMORY_FRACTION))
    }
}

/// Minimum free memory a device must report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMinMemory", into = "RawMinMemory")]
pub enum MinMemory {
    /// Absolute amount in MiB
    Absolute(u64),
    /// Share of the device's total memory, strictly between 0 and 1
    Fraction(f64),
}

impl MinMemory {
    /// Free MiB required on a device with `total_mib` of memory
    pub fn required_mib(&self, total_mib: u64) -> f64 {
        match *self {
            MinMemory::Absolute(mib) => mib as f64,
            MinMemory::Fraction(fraction) => total_mib as f64 * fraction,
        }
    }

    /// Whether a device's memory figures meet the threshold
    pub fn is_met_by(&self, memory: &MemoryInfo) -> bool {
        memory.free_mib as f64 >= self.required_mib(memory.total_mib)
    }

    fn validate(&self) -> GpuschedResult<()> {
        match *self {
            MinMemory::Fraction(f) if !(f > 0.0 && f < 1.0) => Err(GpuschedError::Config(
                format!(
                    "min_memory fraction must be strictly between 0 and 1, got {}",
                    f
                ),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for MinMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinMemory::Absolute(mib) => write!(f, "{} MiB", mib),
            MinMemory::Fraction(fraction) => write!(f, "{}% of total", fraction * 100.0),
        }
    }
}

impl FromStr for MinMemory {
    type Err = GpuschedError;

    /// Integers are MiB, decimals are fractions of total memory
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(mib) = s.parse::<u64>() {
            return Ok(MinMemory::Absolute(mib));
        }
        let fraction = s.parse::<f64>().map_err(|_| {
            GpuschedError::Config(format!(
                "min_memory must be an integer MiB amount or a fraction, got {:?}",
                s
            ))
        })?;
        let min_memory = MinMemory::Fraction(fraction);
        min_memory.validate()?;
        Ok(min_memory)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawMinMemory {
    Mib(u64),
    Ratio(f64),
}

impl TryFrom<RawMinMemory> for MinMemory {
    type Error = String;

    fn try_from(raw: RawMinMemory) -> Result<Self, Self::Error> {
        let min_memory = match raw {
            RawMinMemory::Mib(mib) => MinMemory::Absolute(mib),
            RawMinMemory::Ratio(fraction) => MinMemory::Fraction(fraction),
        };
        min_memory.validate().map_err(|e| e.to_string())?;
        Ok(min_memory)
    }
}

impl From<MinMemory> for RawMinMemory {
    fn from(min_memory: MinMemory) -> Self {
        match min_memory {
            MinMemory::Absolute(mib) => RawMinMemory::Mib(mib),
            MinMemory::Fraction(fraction) => RawMinMemory::Ratio(fraction),
        }
    }
}

/// Which device query decides whether a GPU has room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Free/total memory per device, compared against `min_memory`
    #[default]
    Memory,
    /// Which devices host a compute process
    Occupancy,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::Memory => write!(f, "memory"),
            ProbeMode::Occupancy => write!(f, "occupancy"),
        }
    }
}

impl FromStr for ProbeMode {
    type Err = GpuschedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(ProbeMode::Memory),
            "occupancy" => Ok(ProbeMode::Occupancy),
            other => Err(GpuschedError::Config(format!(
                "Unknown probe mode {:?} (expected \"memory\" or \"occupancy\")",
                other
            ))),
        }
    }
}

/// Where device information comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeBackend {
    /// Parse the CSV output of the `nvidia-smi` tool
    #[default]
    NvidiaSmi,
    /// Query the driver through NVML (requires the `nvml` feature)
    Nvml,
}

/// Device probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Query shape
    pub mode: ProbeMode,
    /// Probe implementation
    pub backend: ProbeBackend,
    /// Path to the nvidia-smi binary
    pub nvidia_smi_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::Memory,
            backend: ProbeBackend::NvidiaSmi,
            nvidia_smi_path: PathBuf::from("nvidia-smi"),
        }
    }
}

/// Job runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Environment variable restricting a job to its assigned device
    pub visibility_env: String,
    /// Shell used to run job commands (defaults to `sh` or `cmd`)
    pub shell: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            visibility_env: "CUDA_VISIBLE_DEVICES".to_string(),
            shell: None,
        }
    }
}

impl RuntimeConfig {
    /// Reject unusable environment variable names
    pub fn validate(&self) -> GpuschedResult<()> {
        if self.visibility_env.is_empty()
            || self.visibility_env.contains('=')
            || self.visibility_env.contains('\0')
        {
            return Err(GpuschedError::Config(format!(
                "visibility_env {:?} is not a valid environment variable name",
                self.visibility_env
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

//! Probe and runtime doubles shared by the scheduler tests

use async_trait::async_trait;
use gpusched_core::{
    DeviceProbe, DeviceStatus, GpuschedError, GpuschedResult, Job, JobOutcome, ProbeMode,
};
use gpusched_runtime::Runtime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Probe replaying a list of rounds; the last round repeats forever.
/// A `None` round is a failed query.
pub struct ScriptedProbe {
    rounds: Vec<Option<Vec<DeviceStatus>>>,
    mode: ProbeMode,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(mode: ProbeMode, rounds: Vec<Option<Vec<DeviceStatus>>>) -> Arc<Self> {
        assert!(!rounds.is_empty());
        Arc::new(Self {
            rounds,
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn fixed(mode: ProbeMode, devices: Vec<DeviceStatus>) -> Arc<Self> {
        Self::new(mode, vec![Some(devices)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceProbe for ScriptedProbe {
    async fn probe(&self) -> GpuschedResult<Vec<DeviceStatus>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let round = &self.rounds[call.min(self.rounds.len() - 1)];
        round
            .clone()
            .ok_or_else(|| GpuschedError::Probe("scripted probe failure".to_string()))
    }

    fn mode(&self) -> ProbeMode {
        self.mode
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

enum Behavior {
    Outcome(JobOutcome),
    Error,
    Panic,
}

/// Runtime recording launches instead of spawning processes
pub struct ScriptedRuntime {
    gate: Option<Semaphore>,
    duration: Option<Duration>,
    behaviors: Mutex<HashMap<String, Behavior>>,
    launches: Mutex<Vec<(u32, String)>>,
    running: Mutex<HashMap<u32, u32>>,
    peak: Mutex<HashMap<u32, u32>>,
}

impl ScriptedRuntime {
    fn build(gate: Option<Semaphore>, duration: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            gate,
            duration,
            behaviors: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            running: Mutex::new(HashMap::new()),
            peak: Mutex::new(HashMap::new()),
        })
    }

    /// Jobs finish as soon as they start
    pub fn immediate() -> Arc<Self> {
        Self::build(None, None)
    }

    /// Jobs run until `release_all` is called
    pub fn held() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), None)
    }

    /// Jobs run for a fixed time
    pub fn timed(duration: Duration) -> Arc<Self> {
        Self::build(None, Some(duration))
    }

    pub fn release_all(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    pub fn fail_command(&self, command: &str, outcome: JobOutcome) {
        self.behaviors
            .lock()
            .insert(command.to_string(), Behavior::Outcome(outcome));
    }

    pub fn error_command(&self, command: &str) {
        self.behaviors
            .lock()
            .insert(command.to_string(), Behavior::Error);
    }

    pub fn panic_command(&self, command: &str) {
        self.behaviors
            .lock()
            .insert(command.to_string(), Behavior::Panic);
    }

    /// (gpu, command) in launch order
    pub fn launches(&self) -> Vec<(u32, String)> {
        self.launches.lock().clone()
    }

    /// Highest number of jobs seen running at once on a GPU
    pub fn peak(&self, gpu_id: u32) -> u32 {
        self.peak.lock().get(&gpu_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    async fn run_job(&self, job: &Job, gpu_id: u32) -> GpuschedResult<JobOutcome> {
        self.launches.lock().push((gpu_id, job.command.clone()));
        {
            let mut running = self.running.lock();
            let count = running.entry(gpu_id).or_insert(0);
            *count += 1;
            let mut peak = self.peak.lock();
            let max = peak.entry(gpu_id).or_insert(0);
            *max = (*max).max(*count);
        }

        if let Some(gate) = &self.gate {
            let _ = gate.acquire().await;
        }
        if let Some(duration) = self.duration {
            tokio::time::sleep(duration).await;
        }

        if let Some(count) = self.running.lock().get_mut(&gpu_id) {
            *count -= 1;
        }

        match self.behaviors.lock().get(&job.command) {
            None => Ok(JobOutcome::Succeeded),
            Some(Behavior::Outcome(outcome)) => Ok(outcome.clone()),
            Some(Behavior::Error) => Err(GpuschedError::Runtime(format!(
                "cannot launch {}",
                job.command
            ))),
            Some(Behavior::Panic) => panic!("scripted panic for {}", job.command),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

//! Job and job outcome types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A queued shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Command line handed to the shell
    pub command: String,
}

impl Job {
    /// Create a job from a command line
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Read a job queue from text, one command per line.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse_queue(text: &str) -> Vec<Job> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Job::new)
            .collect()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// How a dispatched job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The command exited successfully
    Succeeded,
    /// The command exited with a failure status (`None` when killed by a signal)
    Failed { exit_code: Option<i32> },
    /// The command could not be started
    LaunchFailed(String),
}

impl JobOutcome {
    /// Whether the job succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Succeeded => write!(f, "succeeded"),
            JobOutcome::Failed {
                exit_code: Some(code),
            } => write!(f, "failed with exit code {}", code),
            JobOutcome::Failed { exit_code: None } => write!(f, "terminated by signal"),
            JobOutcome::LaunchFailed(reason) => write!(f, "failed to launch: {}", reason),
        }
    }
}

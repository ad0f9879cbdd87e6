//! Launching the external sync job.
//!
//! The job is an opaque executable. We start it, wait for it to exit and
//! never look at its exit code for success: the job reports its own outcome
//! through `status.json`.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Analyze changes, then copy.
    Default,
    /// Skip the counting phase and copy everything.
    Full,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Full => f.write_str("full"),
        }
    }
}

/// How to start the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInvocation {
    /// Optional interpreter the script is run through (e.g. `/bin/bash`).
    pub interpreter: Option<PathBuf>,
    pub script: PathBuf,
    pub full_flag: String,
}

impl JobInvocation {
    /// argv for a run in `mode`: the script with no arguments, or with the
    /// full-run flag appended.
    pub fn argv(&self, mode: RunMode) -> Vec<String> {
        let mut argv = Vec::with_capacity(3);
        if let Some(interpreter) = &self.interpreter {
            argv.push(interpreter.display().to_string());
        }
        argv.push(self.script.display().to_string());
        if mode == RunMode::Full {
            argv.push(self.full_flag.clone());
        }
        argv
    }

    /// argv the OS scheduler should use for unattended runs.
    pub fn scheduled_argv(&self) -> Vec<String> {
        self.argv(RunMode::Default)
    }
}

/// How a job process ended, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobExit {
    /// Exited with a code (None when killed by a signal).
    Exited(Option<i32>),
    /// Could not be started at all.
    LaunchFailed(String),
    /// The worker itself died before reporting.
    Aborted(String),
}

impl fmt::Display for JobExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(Some(code)) => write!(f, "exited with code {}", code),
            Self::Exited(None) => f.write_str("terminated by signal"),
            Self::LaunchFailed(e) => write!(f, "failed to launch: {}", e),
            Self::Aborted(e) => write!(f, "worker aborted: {}", e),
        }
    }
}

#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Start the job and wait for it to exit. Never errors: launch failures
    /// are reported as `JobExit::LaunchFailed`.
    async fn run(&self, mode: RunMode) -> JobExit;
}

/// Runs the job as a child process.
pub struct ProcessLauncher {
    invocation: JobInvocation,
}

impl ProcessLauncher {
    pub fn new(invocation: JobInvocation) -> Self {
        Self { invocation }
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn run(&self, mode: RunMode) -> JobExit {
        let argv = self.invocation.argv(mode);
        let Some((program, args)) = argv.split_first() else {
            return JobExit::LaunchFailed("empty command line".to_string());
        };

        debug!(program = %program, ?args, "Spawning sync job");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(false)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %program, error = %e, "Failed to spawn sync job");
                return JobExit::LaunchFailed(e.to_string());
            }
        };

        match child.wait().await {
            Ok(status) => JobExit::Exited(status.code()),
            Err(e) => JobExit::Aborted(format!("failed to wait for job: {}", e)),
        }
    }
}

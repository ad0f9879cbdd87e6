use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::schedule::{Descriptor, ScheduleSpec};
use crate::error::ScheduleError;
use crate::store::write_atomic;

mod launchd;
mod simulated;
mod systemd;

pub use launchd::LaunchdScheduler;
pub use simulated::{SchedulerCall, SimulatedScheduler};
pub use systemd::SystemdScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Launchd,
    Systemd,
    Simulated,
}

impl SchedulerKind {
    pub fn host_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Launchd
        } else {
            Self::Systemd
        }
    }
}

/// A calendar-triggered process scheduler living outside this process.
///
/// All methods block on short-lived helper commands; call them from a
/// blocking context when on an async runtime.
pub trait SchedulerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render the declarative descriptor for `spec`. Must be deterministic.
    fn render(&self, spec: &ScheduleSpec) -> Descriptor;

    /// Remove a previously installed descriptor from the live scheduler.
    fn unload(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError>;

    /// Persist the descriptor files where the scheduler expects them.
    fn write(&self, descriptor: &Descriptor) -> Result<(), ScheduleError> {
        for (path, content) in &descriptor.files {
            write_atomic(path, content.as_bytes())?;
        }
        Ok(())
    }

    /// Load and activate the written descriptor.
    fn load(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError>;
}

pub fn get_scheduler(kind: SchedulerKind, descriptor_dir: PathBuf) -> Box<dyn SchedulerBackend> {
    match kind {
        SchedulerKind::Launchd => Box::new(LaunchdScheduler::new(descriptor_dir)),
        SchedulerKind::Systemd => Box::new(SystemdScheduler::new(descriptor_dir)),
        SchedulerKind::Simulated => Box::new(SimulatedScheduler::new()),
    }
}

/// Run a scheduler helper command to completion, discarding its output.
fn run_command(program: &str, args: &[&str]) -> Result<ExitStatus, ScheduleError> {
    let command = format!("{} {}", program, args.join(" "));
    debug!(command = %command, "Running scheduler command");

    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| ScheduleError::Spawn { command, source })
}

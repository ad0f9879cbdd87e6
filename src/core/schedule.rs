//! Schedule compiler.
//!
//! Turns the hour/minute/days of a `BackupConfig` into calendar triggers and
//! hands them to a `SchedulerBackend`, which renders the OS descriptor and
//! reinstalls it with the live scheduler.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::adapters::SchedulerBackend;
use crate::core::models::BackupConfig;
use crate::error::ScheduleError;

/// One calendar condition understood by the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Trigger {
    /// None fires every day.
    pub weekday: Option<u8>,
    pub hour: u8,
    pub minute: u8,
}

/// Everything a backend needs to render a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub label: String,
    /// Full argv of the job as the scheduler should launch it.
    pub program_arguments: Vec<String>,
    pub stderr_log: PathBuf,
    pub triggers: Vec<Trigger>,
}

/// A rendered descriptor ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub files: Vec<(PathBuf, String)>,
}

/// Compile the recurring schedule of `config` into triggers.
///
/// An empty day set yields a single daily trigger. Otherwise one trigger per
/// distinct weekday, ascending. Weekday range is not validated here.
pub fn compile_triggers(config: &BackupConfig) -> Vec<Trigger> {
    if config.every_day() {
        return vec![Trigger {
            weekday: None,
            hour: config.hour,
            minute: config.minute,
        }];
    }

    config
        .weekdays()
        .into_iter()
        .map(|day| Trigger {
            weekday: Some(day),
            hour: config.hour,
            minute: config.minute,
        })
        .collect()
}

pub struct ScheduleCompiler<'a> {
    backend: &'a dyn SchedulerBackend,
    label: String,
    program_arguments: Vec<String>,
    stderr_log: PathBuf,
}

impl<'a> ScheduleCompiler<'a> {
    pub fn new(
        backend: &'a dyn SchedulerBackend,
        label: impl Into<String>,
        program_arguments: Vec<String>,
        stderr_log: PathBuf,
    ) -> Self {
        Self {
            backend,
            label: label.into(),
            program_arguments,
            stderr_log,
        }
    }

    pub fn spec_for(&self, config: &BackupConfig) -> ScheduleSpec {
        ScheduleSpec {
            label: self.label.clone(),
            program_arguments: self.program_arguments.clone(),
            stderr_log: self.stderr_log.clone(),
            triggers: compile_triggers(config),
        }
    }

    /// Pure: render the descriptor for `config` without touching the scheduler.
    pub fn compile(&self, config: &BackupConfig) -> Descriptor {
        self.backend.render(&self.spec_for(config))
    }

    /// Compile and reinstall: unload the previous descriptor (failure
    /// tolerated), write the new one, then load/activate it.
    pub fn install(&self, config: &BackupConfig) -> Result<Descriptor, ScheduleError> {
        let spec = self.spec_for(config);
        let descriptor = self.backend.render(&spec);

        if let Err(e) = self.backend.unload(&spec) {
            warn!(label = %spec.label, error = %e, "Unloading previous schedule failed, continuing");
        }

        self.backend.write(&descriptor)?;
        self.backend.load(&spec)?;

        info!(
            label = %spec.label,
            backend = self.backend.name(),
            triggers = spec.triggers.len(),
            "Schedule installed"
        );

        Ok(descriptor)
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::adapters::SchedulerBackend;
use crate::core::schedule::{Descriptor, ScheduleSpec, Trigger};
use crate::error::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Unload(String),
    Write(Descriptor),
    Load(String),
}

#[derive(Default)]
struct SimulatedState {
    calls: Vec<SchedulerCall>,
    installed: Option<Descriptor>,
}

/// In-memory scheduler that records every call.
///
/// Unloading fails when nothing is installed, like a real scheduler asked to
/// remove an unknown job.
#[derive(Clone, Default)]
pub struct SimulatedScheduler {
    state: Arc<Mutex<SimulatedState>>,
    fail_load: bool,
}

impl SimulatedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that refuses to activate anything.
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.lock().calls.clone()
    }

    pub fn installed(&self) -> Option<Descriptor> {
        self.lock().installed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        // A poisoned lock only means a test panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SchedulerBackend for SimulatedScheduler {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn render(&self, spec: &ScheduleSpec) -> Descriptor {
        let mut body = format!("label={}\nargs={}\n", spec.label, spec.program_arguments.join(" "));
        for Trigger {
            weekday,
            hour,
            minute,
        } in &spec.triggers
        {
            match weekday {
                Some(day) => body.push_str(&format!("weekday={} {:02}:{:02}\n", day, hour, minute)),
                None => body.push_str(&format!("daily {:02}:{:02}\n", hour, minute)),
            }
        }

        Descriptor {
            files: vec![(PathBuf::from(format!("{}.sim", spec.label)), body)],
        }
    }

    fn unload(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        let mut state = self.lock();
        state.calls.push(SchedulerCall::Unload(spec.label.clone()));
        match state.installed.take() {
            Some(_) => Ok(()),
            None => Err(ScheduleError::Install {
                command: format!("unload {}", spec.label),
                status: "not loaded".to_string(),
            }),
        }
    }

    fn write(&self, descriptor: &Descriptor) -> Result<(), ScheduleError> {
        self.lock().calls.push(SchedulerCall::Write(descriptor.clone()));
        Ok(())
    }

    fn load(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        let mut state = self.lock();
        state.calls.push(SchedulerCall::Load(spec.label.clone()));

        if self.fail_load {
            return Err(ScheduleError::Activate {
                command: format!("load {}", spec.label),
                status: "refused".to_string(),
            });
        }

        let written = state.calls.iter().rev().find_map(|c| match c {
            SchedulerCall::Write(d) => Some(d.clone()),
            _ => None,
        });
        state.installed = written;
        Ok(())
    }
}

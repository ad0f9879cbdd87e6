//! User-facing actions on the stored schedule.

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::adapters::SchedulerBackend;
use crate::context::AppContext;
use crate::core::models::BackupConfig;
use crate::core::schedule::{Descriptor, ScheduleCompiler};

/// Edits to apply over the stored schedule. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ScheduleEdit {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub days: Option<Vec<u8>>,
    pub source: Option<String>,
    pub destination: Option<String>,
}

impl ScheduleEdit {
    /// Validate and apply onto `config`. Paths are taken verbatim, trailing
    /// separator included.
    pub fn apply(&self, config: &mut BackupConfig) -> Result<()> {
        if let Some(hour) = self.hour {
            if hour > 23 {
                bail!("hour must be between 0 and 23, got {}", hour);
            }
            config.hour = hour;
        }

        if let Some(minute) = self.minute {
            if minute > 59 {
                bail!("minute must be between 0 and 59, got {}", minute);
            }
            config.minute = minute;
        }

        if let Some(days) = &self.days {
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                bail!("weekday must be between 0 (Sunday) and 6 (Saturday), got {}", bad);
            }
            config.days = days.clone();
        }

        if let Some(source) = &self.source {
            ensure_absolute("source", source)?;
            config.source = source.clone();
        }

        if let Some(destination) = &self.destination {
            ensure_absolute("destination", destination)?;
            config.destination = destination.clone();
        }

        Ok(())
    }
}

fn ensure_absolute(what: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        bail!("{} must be an absolute path, got '{}'", what, path);
    }
    Ok(())
}

/// The stored schedule, or the defaults if there is none yet.
pub fn current_config(ctx: &AppContext) -> BackupConfig {
    ctx.store
        .load::<BackupConfig>()
        .unwrap_or_else(BackupConfig::with_defaults)
}

pub fn compiler<'a>(ctx: &AppContext, backend: &'a dyn SchedulerBackend) -> ScheduleCompiler<'a> {
    ScheduleCompiler::new(
        backend,
        ctx.config.schedule_label.clone(),
        ctx.config.invocation().scheduled_argv(),
        ctx.config.stderr_log.clone(),
    )
}

/// "Save schedule": merge `edit` over the stored config, persist it, then
/// reinstall the OS schedule.
pub fn save_schedule(
    ctx: &AppContext,
    backend: &dyn SchedulerBackend,
    edit: &ScheduleEdit,
) -> Result<(BackupConfig, Descriptor)> {
    let mut config = current_config(ctx);
    edit.apply(&mut config)?;

    ctx.store
        .save(&config)
        .context("Failed to save schedule config")?;

    let descriptor = compiler(ctx, backend)
        .install(&config)
        .context("Failed to install schedule")?;

    info!(
        hour = config.hour,
        minute = config.minute,
        days = ?config.days,
        "Schedule saved"
    );

    Ok((config, descriptor))
}

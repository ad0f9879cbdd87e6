//! Application settings.
//!
//! Layered with figment: built-in defaults, then the TOML settings file,
//! then `FOLDER_SYNC_*` environment variables, then command-line flags.
//! The backup schedule itself is not a setting; it lives in the data
//! directory as `config.json` (see `core::models::BackupConfig`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::adapters::SchedulerKind;
use crate::core::job::JobInvocation;
use crate::core::poller::DEFAULT_POLL_INTERVAL;

const ENV_PREFIX: &str = "FOLDER_SYNC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where config.json, status.json and progress.json live.
    pub data_dir: PathBuf,
    /// The external sync job.
    pub job_script: PathBuf,
    pub interpreter: Option<PathBuf>,
    /// Argument requesting a full copy without the counting phase.
    pub full_flag: String,
    pub poll_interval_ms: u64,
    pub scheduler: SchedulerKind,
    pub schedule_label: String,
    /// Defaults to the scheduler's per-user directory.
    pub descriptor_dir: Option<PathBuf>,
    pub stderr_log: PathBuf,
    /// Log written by the job itself.
    pub log_file: PathBuf,
    /// Run through the same executable context as the job's copy tool.
    pub probe_program: PathBuf,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = home();

        Self {
            data_dir: home.join(".local/share/backup-dev-apps"),
            job_script: home.join(".local/bin/backup-dev-apps.sh"),
            interpreter: Some(PathBuf::from("/bin/bash")),
            full_flag: "--full".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            scheduler: SchedulerKind::host_default(),
            schedule_label: "com.klab.folder-sync".to_string(),
            descriptor_dir: None,
            stderr_log: home.join(".local/logs/backup-dev-apps-stderr.log"),
            log_file: home.join(".local/logs/backup-dev-apps.log"),
            probe_program: PathBuf::from("/bin/ls"),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Resolve settings. `settings_file` falls back to the default location;
    /// a missing file is not an error.
    pub fn new<T: Serialize>(
        settings_file: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, figment::Error> {
        let settings_file = settings_file
            .map(Path::to_path_buf)
            .or_else(Self::default_settings_path);

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = settings_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract()
    }

    pub fn default_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("folder-sync").join("settings.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn descriptor_dir(&self) -> PathBuf {
        if let Some(dir) = &self.descriptor_dir {
            return dir.clone();
        }

        match self.scheduler {
            SchedulerKind::Launchd => home().join("Library/LaunchAgents"),
            SchedulerKind::Systemd => dirs::config_dir()
                .unwrap_or_else(|| home().join(".config"))
                .join("systemd/user"),
            SchedulerKind::Simulated => self.data_dir.join("scheduler"),
        }
    }

    pub fn invocation(&self) -> JobInvocation {
        JobInvocation {
            interpreter: self.interpreter.clone(),
            script: self.job_script.clone(),
            full_flag: self.full_flag.clone(),
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

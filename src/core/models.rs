//! Documents exchanged with the external sync job.
//!
//! All three are whole-file JSON values. `BackupConfig` is owned by the user;
//! `BackupStatus` and `BackupProgress` are written by the job itself and are
//! read-only telemetry here.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON document persisted by the `StateStore` under a fixed file name.
pub trait Document: Serialize + for<'de> Deserialize<'de> {
    const FILE_NAME: &'static str;
}

/// Recurring schedule and copy paths.
///
/// Fields are declared in alphabetical order so the serialized file keeps a
/// stable, sorted key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Weekdays (0 = Sunday .. 6 = Saturday). Empty means every day.
    #[serde(default)]
    pub days: Vec<u8>,
    /// Kept verbatim: a trailing separator changes what the copy tool does.
    pub destination: String,
    pub hour: u8,
    pub minute: u8,
    pub source: String,
}

impl BackupConfig {
    /// Defaults applied on first schedule edit when no config exists yet.
    pub fn with_defaults() -> Self {
        let home = dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        Self {
            days: Vec::new(),
            destination: "/Volumes/Toshiba/dev/".to_string(),
            hour: 10,
            minute: 0,
            source: format!("{}/dev/", home),
        }
    }

    /// Distinct weekdays in ascending order.
    pub fn weekdays(&self) -> BTreeSet<u8> {
        self.days.iter().copied().collect()
    }

    pub fn every_day(&self) -> bool {
        self.days.is_empty()
    }
}

impl Document for BackupConfig {
    const FILE_NAME: &'static str = "config.json";
}

/// Outcome of the last run as reported by the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Ok,
    Skip,
    Error,
    #[serde(other)]
    Unknown,
}

impl RunOutcome {
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Ok => "[OK]",
            Self::Skip => "[SKIP]",
            Self::Error => "[ERR]",
            Self::Unknown => "[?]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    pub last_run: String,
    pub status: RunOutcome,
    pub files_transferred: u64,
    pub total_size: String,
    pub disk_connected: bool,
}

impl Document for BackupStatus {
    const FILE_NAME: &'static str = "status.json";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Counting,
    Sync,
    Done,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Counting => "counting",
            Self::Sync => "sync",
            Self::Done => "done",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Live progress of the job currently in flight.
///
/// Only meaningful while the run flag is set; a leftover file from a previous
/// run says nothing about liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProgress {
    pub phase: Phase,
    #[serde(default)]
    pub percent: u8,
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
}

impl BackupProgress {
    /// Percentage clamped to 0..=100, or None outside the sync phase.
    pub fn percent(&self) -> Option<u8> {
        match self.phase {
            Phase::Sync => Some(self.percent.min(100)),
            Phase::Done => Some(100),
            Phase::Counting | Phase::Unknown => None,
        }
    }
}

impl Document for BackupProgress {
    const FILE_NAME: &'static str = "progress.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_job_output() {
        let raw = r#"{"lastRun":"2026-10-01 10:00","status":"skip","filesTransferred":0,
                      "totalSize":"0B","diskConnected":false}"#;
        let status: BackupStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.status, RunOutcome::Skip);
        assert!(!status.disk_connected);
    }

    #[test]
    fn test_unrecognised_enum_values_fall_back() {
        let raw = r#"{"lastRun":"x","status":"exploded","filesTransferred":1,
                      "totalSize":"1K","diskConnected":true}"#;
        let status: BackupStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.status, RunOutcome::Unknown);
        assert_eq!(status.status.indicator(), "[?]");

        let progress: BackupProgress =
            serde_json::from_str(r#"{"phase":"verifying","percent":3,"current":1,"total":2}"#)
                .unwrap();
        assert_eq!(progress.phase, Phase::Unknown);
        assert_eq!(progress.percent(), None);
    }

    #[test]
    fn test_config_serializes_with_sorted_keys() {
        let config = BackupConfig {
            days: vec![1, 5],
            destination: "/Volumes/X/dev/".to_string(),
            hour: 9,
            minute: 30,
            source: "/home/u/dev/".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"days":[1,5],"destination":"/Volumes/X/dev/","hour":9,"minute":30,"source":"/home/u/dev/"}"#
        );
    }

    #[test]
    fn test_config_tolerates_extra_and_missing_optional_keys() {
        let raw = r#"{"hour":7,"minute":5,"source":"/a/","destination":"/b","extra":true}"#;
        let config: BackupConfig = serde_json::from_str(raw).unwrap();
        assert!(config.every_day());
        assert_eq!(config.destination, "/b");
    }

    #[test]
    fn test_weekdays_are_distinct_and_sorted() {
        let mut config = BackupConfig::with_defaults();
        config.days = vec![5, 1, 3, 1];
        assert_eq!(config.weekdays().into_iter().collect::<Vec<_>>(), vec![1, 3, 5]);
    }
}

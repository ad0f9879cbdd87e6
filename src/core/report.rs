//! Plain-data views of the documents for whatever presents them.

use std::path::Path;

use serde::Serialize;

use crate::core::models::{BackupConfig, BackupProgress, BackupStatus, Phase, RunOutcome};
use crate::core::probe::volume_root;

const BAR_WIDTH: usize = 20;
const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// What to show for the job in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProgressView {
    Idle,
    /// Running, but the job has not written progress yet.
    Starting,
    Analyzing,
    Syncing { current: u64, total: u64, percent: u8 },
    Finishing,
    /// Running with a phase we do not recognise.
    Running,
}

impl ProgressView {
    /// Liveness comes from the run flag only; the document may be stale.
    pub fn from_progress(running: bool, progress: Option<&BackupProgress>) -> Self {
        if !running {
            return Self::Idle;
        }

        let Some(p) = progress else {
            return Self::Starting;
        };

        match p.phase {
            Phase::Counting => Self::Analyzing,
            Phase::Sync => Self::Syncing {
                current: p.current,
                total: p.total,
                percent: p.percent.min(100),
            },
            Phase::Done => Self::Finishing,
            Phase::Unknown => Self::Running,
        }
    }

    pub fn label(&self) -> Option<String> {
        match self {
            Self::Idle => None,
            Self::Starting => Some("Starting backup...".to_string()),
            Self::Analyzing => Some("Analyzing changes...".to_string()),
            Self::Syncing { current, total, .. } => {
                Some(format!("Syncing: {} / {} items", current, total))
            }
            Self::Finishing => Some("Finishing...".to_string()),
            Self::Running => Some("Running...".to_string()),
        }
    }

    /// Text progress bar; None when there is nothing to draw.
    pub fn bar(&self) -> Option<String> {
        match self {
            Self::Analyzing => Some(render_bar(None)),
            Self::Syncing { percent, .. } => Some(render_bar(Some(*percent))),
            Self::Finishing => Some(render_bar(Some(100))),
            Self::Idle | Self::Starting | Self::Running => None,
        }
    }

    /// Short suffix for a status indicator: ` ...`, ` 42%` or empty.
    pub fn title(&self) -> String {
        match self {
            Self::Analyzing => " ...".to_string(),
            Self::Syncing { percent, .. } => format!(" {}%", percent),
            _ => String::new(),
        }
    }
}

/// `[####................]  20%`, or an indeterminate `[===   ...]  ...`.
pub fn render_bar(percent: Option<u8>) -> String {
    match percent {
        None => format!("[{}{}]  ...", "=".repeat(3), " ".repeat(BAR_WIDTH - 3)),
        Some(percent) => {
            let percent = percent.min(100);
            let filled = (percent as usize * BAR_WIDTH / 100).min(BAR_WIDTH);
            format!(
                "[{}{}]  {}%",
                "#".repeat(filled),
                ".".repeat(BAR_WIDTH - filled),
                percent
            )
        }
    }
}

/// `HH:MM | every day` or `HH:MM | Mon, Wed, Fri`.
pub fn schedule_line(config: &BackupConfig) -> String {
    let days = if config.every_day() {
        "every day".to_string()
    } else {
        config
            .weekdays()
            .into_iter()
            .map(|d| WEEKDAY_NAMES.get(d as usize).copied().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{:02}:{:02} | {}", config.hour, config.minute, days)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastRun {
    pub when: String,
    pub outcome: RunOutcome,
    pub indicator: &'static str,
    pub files_transferred: u64,
    pub total_size: String,
    /// Destination reachable when the job finished.
    pub disk_connected_then: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub last_run: Option<LastRun>,
    /// Destination volume mounted right now.
    pub disk_connected_now: bool,
    /// Destination folder itself exists (can be opened).
    pub destination_available: bool,
    pub destination: String,
    pub schedule: Option<String>,
    pub progress: ProgressView,
}

impl StatusReport {
    pub fn build(
        config: Option<&BackupConfig>,
        status: Option<&BackupStatus>,
        running: bool,
        progress: Option<&BackupProgress>,
    ) -> Self {
        let destination = config
            .map(|c| c.destination.clone())
            .unwrap_or_else(|| BackupConfig::with_defaults().destination);

        let last_run = status.map(|s| LastRun {
            when: s.last_run.clone(),
            outcome: s.status,
            indicator: s.status.indicator(),
            files_transferred: s.files_transferred,
            total_size: s.total_size.clone(),
            disk_connected_then: s.disk_connected,
        });

        Self {
            last_run,
            disk_connected_now: volume_root(&destination).exists(),
            destination_available: Path::new(&destination).exists(),
            destination,
            schedule: config.map(schedule_line),
            progress: ProgressView::from_progress(running, progress),
        }
    }

    /// Human-readable lines, in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(label) = self.progress.label() {
            lines.push(label);
            if let Some(bar) = self.progress.bar() {
                lines.push(bar);
            }
        }

        match &self.last_run {
            Some(run) => {
                lines.push(format!("Last backup:  {}", run.when));
                lines.push(format!(
                    "Status:  {}  |  Files: {}",
                    run.indicator, run.files_transferred
                ));
                lines.push(format!("Size:  {}", run.total_size));

                let then = connected(run.disk_connected_then);
                let now = connected(self.disk_connected_now);
                if then != now {
                    lines.push(format!("Disk (last run):  {}  |  Now:  {}", then, now));
                } else {
                    lines.push(format!("Disk:  {}", now));
                }
            }
            None => lines.push("No backup data yet".to_string()),
        }

        if let Some(schedule) = &self.schedule {
            lines.push(format!("Schedule:  {}", schedule));
        }

        lines
    }
}

fn connected(yes: bool) -> &'static str {
    if yes { "Connected" } else { "Not connected" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(phase: Phase, percent: u8, current: u64, total: u64) -> BackupProgress {
        BackupProgress {
            phase,
            percent,
            current,
            total,
        }
    }

    #[test]
    fn test_progress_view_ignores_document_when_idle() {
        let stale = progress(Phase::Done, 100, 5, 5);
        assert_eq!(ProgressView::from_progress(false, Some(&stale)), ProgressView::Idle);
        assert_eq!(ProgressView::from_progress(true, None), ProgressView::Starting);
    }

    #[test]
    fn test_progress_view_phases() {
        let counting = ProgressView::from_progress(true, Some(&progress(Phase::Counting, 0, 0, 0)));
        assert_eq!(counting.title(), " ...");
        assert_eq!(counting.bar().unwrap(), "[===                 ]  ...");

        let sync = ProgressView::from_progress(true, Some(&progress(Phase::Sync, 45, 45, 100)));
        assert_eq!(sync.label().unwrap(), "Syncing: 45 / 100 items");
        assert_eq!(sync.title(), " 45%");
        assert_eq!(sync.bar().unwrap(), "[#########...........]  45%");

        let done = ProgressView::from_progress(true, Some(&progress(Phase::Done, 0, 0, 0)));
        assert_eq!(done.bar().unwrap(), "[####################]  100%");
        assert_eq!(done.title(), "");

        let other = ProgressView::from_progress(true, Some(&progress(Phase::Unknown, 0, 0, 0)));
        assert_eq!(other.label().unwrap(), "Running...");
    }

    #[test]
    fn test_schedule_line() {
        let mut config = BackupConfig::with_defaults();
        assert_eq!(schedule_line(&config), "10:00 | every day");

        config.hour = 9;
        config.minute = 5;
        config.days = vec![5, 1, 3, 1];
        assert_eq!(schedule_line(&config), "09:05 | Mon, Wed, Fri");
    }

    #[test]
    fn test_report_without_status() {
        let report = StatusReport::build(None, None, false, None);
        assert!(report.last_run.is_none());
        assert!(report.schedule.is_none());
        assert_eq!(report.lines(), vec!["No backup data yet".to_string()]);
    }

    #[test]
    fn test_report_flags_disk_change_since_last_run() {
        let mut config = BackupConfig::with_defaults();
        config.destination = "/Volumes/FolderSyncMissingDisk/dev/".to_string();
        let status = BackupStatus {
            last_run: "2026-10-17 10:00".to_string(),
            status: RunOutcome::Ok,
            files_transferred: 12,
            total_size: "3.4M".to_string(),
            disk_connected: true,
        };

        let report = StatusReport::build(Some(&config), Some(&status), false, None);
        assert!(!report.disk_connected_now);
        assert!(!report.destination_available);

        let lines = report.lines();
        assert!(lines.contains(&"Status:  [OK]  |  Files: 12".to_string()));
        assert!(lines.contains(&"Disk (last run):  Connected  |  Now:  Not connected".to_string()));
        assert_eq!(lines.last().unwrap(), "Schedule:  10:00 | every day");
    }
}

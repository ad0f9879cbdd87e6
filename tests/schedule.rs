//! Schedule compilation and installation through the scheduler backends.

use std::path::PathBuf;

use folder_sync::adapters::{
    LaunchdScheduler, SchedulerBackend, SchedulerCall, SchedulerKind, SimulatedScheduler,
    SystemdScheduler,
};
use folder_sync::config::AppConfig;
use folder_sync::context::AppContext;
use folder_sync::core::{BackupConfig, ScheduleCompiler, Trigger, compile_triggers};
use folder_sync::service::{ScheduleEdit, save_schedule};
use tempfile::tempdir;

const LABEL: &str = "com.klab.folder-sync";

fn config(hour: u8, minute: u8, days: &[u8]) -> BackupConfig {
    BackupConfig {
        days: days.to_vec(),
        destination: "/Volumes/Backup/project/".to_string(),
        hour,
        minute,
        source: "/Users/u/dev/".to_string(),
    }
}

fn compiler(backend: &dyn SchedulerBackend) -> ScheduleCompiler<'_> {
    ScheduleCompiler::new(
        backend,
        LABEL,
        vec![
            "/bin/bash".to_string(),
            "/Users/u/.local/bin/backup-dev-apps.sh".to_string(),
        ],
        PathBuf::from("/Users/u/.local/logs/backup-dev-apps-stderr.log"),
    )
}

#[test]
fn test_every_day_schedule_has_one_entry() {
    let triggers = compile_triggers(&config(10, 0, &[]));
    assert_eq!(
        triggers,
        vec![Trigger {
            weekday: None,
            hour: 10,
            minute: 0
        }]
    );

    let launchd = LaunchdScheduler::new(PathBuf::from("/Users/u/Library/LaunchAgents"));
    let descriptor = compiler(&launchd).compile(&config(10, 0, &[]));
    let plist = &descriptor.files[0].1;

    assert_eq!(plist.matches("<key>Hour</key>").count(), 1);
    assert!(plist.contains("<key>Hour</key>\n        <integer>10</integer>"));
    assert!(plist.contains("<key>Minute</key>\n        <integer>0</integer>"));
    assert!(!plist.contains("<key>Weekday</key>"));
}

#[test]
fn test_duplicate_weekdays_collapse() {
    let triggers = compile_triggers(&config(9, 30, &[1, 3, 1, 5]));
    assert_eq!(triggers.len(), 3);
    assert_eq!(
        triggers.iter().map(|t| t.weekday).collect::<Vec<_>>(),
        vec![Some(1), Some(3), Some(5)]
    );
    assert!(triggers.iter().all(|t| t.hour == 9 && t.minute == 30));

    let launchd = LaunchdScheduler::new(PathBuf::from("/Users/u/Library/LaunchAgents"));
    let plist = compiler(&launchd)
        .compile(&config(9, 30, &[1, 3, 1, 5]))
        .files
        .remove(0)
        .1;
    assert_eq!(plist.matches("<key>Weekday</key>").count(), 3);
    assert_eq!(plist.matches("<integer>9</integer>").count(), 3);
    assert_eq!(plist.matches("<integer>30</integer>").count(), 3);
}

#[test]
fn test_compilation_is_deterministic() {
    let launchd = LaunchdScheduler::new(PathBuf::from("/agents"));
    let systemd = SystemdScheduler::new(PathBuf::from("/units"));
    let backends: [&dyn SchedulerBackend; 2] = [&launchd, &systemd];

    for backend in backends {
        let a = compiler(backend).compile(&config(6, 15, &[5, 0, 5, 2]));
        let b = compiler(backend).compile(&config(6, 15, &[0, 2, 5]));
        assert_eq!(a, b, "{} output differs", backend.name());
        assert_eq!(a, compiler(backend).compile(&config(6, 15, &[5, 0, 5, 2])));
    }
}

#[test]
fn test_install_tolerates_missing_previous_schedule() {
    let scheduler = SimulatedScheduler::new();
    let descriptor = compiler(&scheduler).install(&config(10, 0, &[])).unwrap();

    // Nothing was loaded yet, so the unload step failed and was ignored.
    assert_eq!(
        scheduler.calls(),
        vec![
            SchedulerCall::Unload(LABEL.to_string()),
            SchedulerCall::Write(descriptor.clone()),
            SchedulerCall::Load(LABEL.to_string()),
        ]
    );
    assert_eq!(scheduler.installed(), Some(descriptor));
}

#[test]
fn test_reinstall_replaces_previous_schedule() {
    let scheduler = SimulatedScheduler::new();
    compiler(&scheduler).install(&config(10, 0, &[])).unwrap();
    let second = compiler(&scheduler).install(&config(9, 30, &[1])).unwrap();

    assert_eq!(scheduler.calls().len(), 6);
    assert_eq!(scheduler.installed(), Some(second.clone()));
    assert!(second.files[0].1.contains("weekday=1 09:30"));
}

#[test]
fn test_activation_failure_is_surfaced() {
    let scheduler = SimulatedScheduler::failing_load();
    assert!(compiler(&scheduler).install(&config(10, 0, &[])).is_err());
    assert!(scheduler.installed().is_none());
}

#[test]
fn test_save_schedule_persists_then_installs() {
    let temp = tempdir().unwrap();
    let ctx = AppContext::new(AppConfig {
        data_dir: temp.path().to_path_buf(),
        scheduler: SchedulerKind::Simulated,
        ..AppConfig::default()
    });
    let scheduler = SimulatedScheduler::new();

    let edit = ScheduleEdit {
        hour: Some(9),
        minute: Some(30),
        days: Some(vec![1, 3, 1, 5]),
        destination: Some("/Volumes/Backup/project/".to_string()),
        ..Default::default()
    };
    let (saved, descriptor) = save_schedule(&ctx, &scheduler, &edit).unwrap();

    // Duplicates are kept in the document; the compiler collapses them.
    assert_eq!(saved.days, vec![1, 3, 1, 5]);
    assert_eq!(ctx.store.load::<BackupConfig>(), Some(saved.clone()));
    assert_eq!(scheduler.installed(), Some(descriptor.clone()));
    assert_eq!(descriptor.files[0].1.matches("weekday=").count(), 3);

    // A later edit starts from the stored document, not from defaults.
    let edit = ScheduleEdit {
        days: Some(vec![]),
        ..Default::default()
    };
    let (saved, descriptor) = save_schedule(&ctx, &scheduler, &edit).unwrap();
    assert_eq!((saved.hour, saved.minute), (9, 30));
    assert_eq!(saved.destination, "/Volumes/Backup/project/");
    assert!(descriptor.files[0].1.contains("daily 09:30"));
}

#[test]
fn test_invalid_edit_does_not_touch_stored_schedule() {
    let temp = tempdir().unwrap();
    let ctx = AppContext::new(AppConfig {
        data_dir: temp.path().to_path_buf(),
        ..AppConfig::default()
    });
    let scheduler = SimulatedScheduler::new();

    let edit = ScheduleEdit {
        minute: Some(75),
        ..Default::default()
    };
    assert!(save_schedule(&ctx, &scheduler, &edit).is_err());
    assert!(ctx.store.load::<BackupConfig>().is_none());
    assert!(scheduler.calls().is_empty());
}

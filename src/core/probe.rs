//! Destination access check.
//!
//! Filesystem grants on some hosts are tracked per executable, so asking
//! whether *this* process can read the volume is not the same question as
//! whether the job can. We run a harmless listing through a separate
//! executable, the way the job's own tools touch the disk, and look only at
//! its exit status.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// The probe listed the volume root.
    Granted,
    /// The volume is not mounted. A connectivity problem, not a permission one.
    VolumeAbsent,
    /// The probe exited non-zero or could not run.
    Denied,
}

impl Access {
    pub fn needs_permissions(&self) -> bool {
        matches!(self, Self::Denied)
    }
}

/// Root of the volume holding `destination`: its first two path segments.
///
/// `/Volumes/Backup/project/` gives `/Volumes/Backup`.
pub fn volume_root(destination: &str) -> PathBuf {
    let segments: Vec<&str> = destination
        .split('/')
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    PathBuf::from(format!("/{}", segments.join("/")))
}

const BUSY_RETRIES: u32 = 5;
const BUSY_BACKOFF: Duration = Duration::from_millis(20);

pub struct CapabilityProber {
    program: PathBuf,
}

impl CapabilityProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Blocks until the probe command exits.
    pub fn check(&self, destination: &str) -> Access {
        let root = volume_root(destination);
        if !root.exists() {
            debug!(volume = %root.display(), "Destination volume not present, skipping probe");
            return Access::VolumeAbsent;
        }

        self.probe(&root)
    }

    fn probe(&self, root: &Path) -> Access {
        let status = retry_busy(|| {
            Command::new(&self.program)
                .arg(root)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
        });

        match status {
            Ok(status) if status.success() => Access::Granted,
            Ok(status) => {
                warn!(volume = %root.display(), %status, "Access probe refused");
                Access::Denied
            }
            Err(e) => {
                warn!(
                    program = %self.program.display(),
                    error = %e,
                    "Access probe could not run, assuming no access"
                );
                Access::Denied
            }
        }
    }
}

/// Retry a spawn that failed with ETXTBSY: the program was still open for
/// writing somewhere, usually an fd inherited by a concurrent fork.
fn retry_busy(mut spawn: impl FnMut() -> io::Result<ExitStatus>) -> io::Result<ExitStatus> {
    let mut attempt = 0;
    loop {
        match spawn() {
            Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < BUSY_RETRIES => {
                attempt += 1;
                debug!(attempt, "Probe program busy, retrying");
                thread::sleep(BUSY_BACKOFF);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use tempfile::tempdir;

    #[test]
    fn test_volume_root_takes_two_segments() {
        assert_eq!(volume_root("/Volumes/Backup/project/"), PathBuf::from("/Volumes/Backup"));
        assert_eq!(volume_root("/Volumes/Backup"), PathBuf::from("/Volumes/Backup"));
        assert_eq!(volume_root("//mnt//disk/a/b"), PathBuf::from("/mnt/disk"));
        assert_eq!(volume_root("/data"), PathBuf::from("/data"));
        assert_eq!(volume_root(""), PathBuf::from("/"));
    }

    #[test]
    fn test_absent_volume_skips_probe() {
        // A probe program that cannot run would report Denied if executed.
        let prober = CapabilityProber::new("/nonexistent/probe-binary");
        let access = prober.check("/Volumes/FolderSyncMissingDisk/project/");
        assert_eq!(access, Access::VolumeAbsent);
        assert!(!access.needs_permissions());
    }

    #[test]
    fn test_probe_launch_failure_is_denied() {
        let temp = tempdir().unwrap();
        let dest = format!("{}/project/", temp.path().display());
        let prober = CapabilityProber::new("/nonexistent/probe-binary");
        assert_eq!(prober.check(&dest), Access::Denied);
    }

    #[test]
    fn test_probe_exit_status_decides() {
        let temp = tempdir().unwrap();
        let script = temp.path().join("probe.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dest = format!("{}/", temp.path().display());
        assert_eq!(CapabilityProber::new(&script).check(&dest), Access::Denied);
        assert_eq!(CapabilityProber::new("/bin/ls").check(&dest), Access::Granted);
    }

    #[test]
    fn test_busy_program_is_retried() {
        let mut calls = 0;
        let status = retry_busy(|| {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from(io::ErrorKind::ExecutableFileBusy))
            } else {
                Ok(ExitStatus::from_raw(0))
            }
        });
        assert!(status.unwrap().success());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_busy_retries_are_bounded() {
        let mut calls = 0;
        let status = retry_busy(|| {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::ExecutableFileBusy))
        });
        assert_eq!(status.unwrap_err().kind(), io::ErrorKind::ExecutableFileBusy);
        assert_eq!(calls, BUSY_RETRIES + 1);
    }

    #[test]
    fn test_access_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&Access::VolumeAbsent).unwrap(),
            "\"volume_absent\""
        );
    }
}

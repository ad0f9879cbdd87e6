use std::path::PathBuf;
use thiserror::Error;

/// Failure to persist a document. Loading never fails; see `StateStore::load`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace '{path}': {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to install a compiled schedule with the live scheduler.
///
/// Removing the previous descriptor is allowed to fail and never produces
/// one of these.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Failed to write schedule descriptor: {0}")]
    Write(#[from] StoreError),

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Install { command: String, status: String },

    #[error("`{command}` exited with {status} while activating the schedule")]
    Activate { command: String, status: String },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Coordinator is no longer running")]
    CoordinatorGone,
}

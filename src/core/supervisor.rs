//! Single-slot job supervisor.
//!
//! The `Supervisor` is the coordinating task. It alone writes the run flag,
//! owns the progress poller and publishes observer events. Each job runs on
//! its own worker task, which only waits for the process to exit; the flag
//! drops back to idle when the supervisor observes that worker finishing,
//! whatever the exit code, and also when the job could not be launched.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::core::job::{JobExit, JobLauncher, RunMode};
use crate::core::models::{BackupProgress, BackupStatus};
use crate::core::poller::{ProgressPoller, ProgressTick};
use crate::error::SupervisorError;
use crate::store::StateStore;

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
enum Command {
    RunNow(RunMode),
}

/// What observers see, in order, for every run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    RunStarted {
        run_id: Uuid,
        mode: RunMode,
        started_at: DateTime<Local>,
    },
    Progress {
        run_id: Uuid,
        tick: ProgressTick,
    },
    RunFinished {
        run_id: Uuid,
        mode: RunMode,
        exit: JobExit,
        duration_secs: u64,
        /// `status.json` as the job left it, or None if this run did not
        /// touch it.
        status: Option<BackupStatus>,
    },
}

struct Worker {
    run_id: Uuid,
    mode: RunMode,
    started: Instant,
    status_before: StatusSnapshot,
    handle: JoinHandle<JobExit>,
}

/// `status.json` as seen when a run starts.
#[derive(Debug)]
struct StatusSnapshot {
    modified: Option<SystemTime>,
    status: Option<BackupStatus>,
}

impl StatusSnapshot {
    fn take(store: &StateStore) -> Self {
        Self {
            modified: store.modified::<BackupStatus>(),
            status: store.load::<BackupStatus>(),
        }
    }

    /// The status now on disk, if it was written since the snapshot.
    fn updated(&self, store: &StateStore) -> Option<BackupStatus> {
        let now = Self::take(store);
        if now.modified == self.modified && now.status == self.status {
            return None;
        }
        now.status
    }
}

pub struct Supervisor {
    store: StateStore,
    launcher: Arc<dyn JobLauncher>,
    poll_interval: Duration,
    commands: mpsc::Receiver<Command>,
    commands_closed: bool,
    run_flag: watch::Sender<bool>,
    events: broadcast::Sender<SupervisorEvent>,
    poller: Option<ProgressPoller>,
    worker: Option<Worker>,
}

/// Cheap, cloneable access to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    run_flag: watch::Receiver<bool>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        store: StateStore,
        launcher: Arc<dyn JobLauncher>,
        poll_interval: Duration,
    ) -> (Self, SupervisorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (flag_tx, flag_rx) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let handle = SupervisorHandle {
            commands: cmd_tx,
            run_flag: flag_rx,
            events: event_tx.clone(),
        };

        let supervisor = Self {
            store,
            launcher,
            poll_interval,
            commands: cmd_rx,
            commands_closed: false,
            run_flag: flag_tx,
            events: event_tx,
            poller: None,
            worker: None,
        };

        (supervisor, handle)
    }

    /// Build a supervisor and run it on its own task.
    pub fn spawn(
        store: StateStore,
        launcher: Arc<dyn JobLauncher>,
        poll_interval: Duration,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (supervisor, handle) = Self::new(store, launcher, poll_interval);
        let task = tokio::spawn(supervisor.run());
        (handle, task)
    }

    /// Run until every handle is dropped and no job is in flight.
    pub async fn run(mut self) {
        debug!("Supervisor started");

        loop {
            tokio::select! {
                cmd = self.commands.recv(), if !self.commands_closed => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => self.commands_closed = true,
                },
                exit = join_worker(&mut self.worker), if self.worker.is_some() => {
                    self.finish_run(exit);
                }
                tick = next_tick(&mut self.poller), if self.poller.is_some() => match tick {
                    Some(tick) => self.publish_tick(tick),
                    None => self.stop_polling(),
                },
                else => break,
            }

            if self.commands_closed && self.worker.is_none() {
                break;
            }
        }

        debug!("Supervisor stopped");
    }

    fn is_running(&self) -> bool {
        *self.run_flag.borrow()
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::RunNow(mode) => self.start_run(mode),
        }
    }

    fn start_run(&mut self, mode: RunMode) {
        if self.is_running() {
            debug!(%mode, "Run requested while a job is in flight, ignoring");
            return;
        }

        // Leftover progress from the previous run must not be shown as ours.
        if let Err(e) = self.store.clear::<BackupProgress>() {
            warn!(error = %e, "Could not clear stale progress document");
        }

        let status_before = StatusSnapshot::take(&self.store);
        let run_id = Uuid::now_v7();
        self.run_flag.send_replace(true);
        self.poller = Some(ProgressPoller::start(
            self.store.clone(),
            self.poll_interval,
            self.run_flag.subscribe(),
        ));

        let launcher = Arc::clone(&self.launcher);
        let span = info_span!("sync_job", %run_id, %mode);
        let handle = tokio::spawn(async move { launcher.run(mode).await }.instrument(span));

        self.worker = Some(Worker {
            run_id,
            mode,
            started: Instant::now(),
            status_before,
            handle,
        });

        info!(%run_id, %mode, "Sync job started");
        self.publish(SupervisorEvent::RunStarted {
            run_id,
            mode,
            started_at: Local::now(),
        });
    }

    fn finish_run(&mut self, exit: JobExit) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.run_flag.send_replace(false);
        self.stop_polling();

        let duration_secs = worker.started.elapsed().as_secs();
        // A job that never started cannot have reported anything.
        let status = match exit {
            JobExit::LaunchFailed(_) => None,
            _ => worker.status_before.updated(&self.store),
        };

        match &exit {
            JobExit::Exited(_) => info!(
                run_id = %worker.run_id,
                exit = %exit,
                duration_secs,
                outcome = ?status.as_ref().map(|s| s.status),
                "Sync job finished"
            ),
            JobExit::LaunchFailed(_) | JobExit::Aborted(_) => warn!(
                run_id = %worker.run_id,
                exit = %exit,
                "Sync job did not complete"
            ),
        }

        self.publish(SupervisorEvent::RunFinished {
            run_id: worker.run_id,
            mode: worker.mode,
            exit,
            duration_secs,
            status,
        });
    }

    fn publish_tick(&mut self, tick: ProgressTick) {
        let Some(run_id) = self.worker.as_ref().map(|w| w.run_id) else {
            self.stop_polling();
            return;
        };
        self.publish(SupervisorEvent::Progress { run_id, tick });
    }

    fn stop_polling(&mut self) {
        if self.poller.take().is_some() {
            debug!("Progress polling stopped");
        }
    }

    fn publish(&self, event: SupervisorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn join_worker(worker: &mut Option<Worker>) -> JobExit {
    match worker {
        Some(worker) => match (&mut worker.handle).await {
            Ok(exit) => exit,
            Err(e) => JobExit::Aborted(e.to_string()),
        },
        None => std::future::pending().await,
    }
}

async fn next_tick(poller: &mut Option<ProgressPoller>) -> Option<ProgressTick> {
    match poller {
        Some(poller) => poller.tick().await,
        None => std::future::pending().await,
    }
}

impl SupervisorHandle {
    /// Ask for a run. Ignored, without error, if a job is already in flight.
    pub async fn run_now(&self, mode: RunMode) -> Result<(), SupervisorError> {
        self.commands
            .send(Command::RunNow(mode))
            .await
            .map_err(|_| SupervisorError::CoordinatorGone)
    }

    pub fn is_running(&self) -> bool {
        *self.run_flag.borrow()
    }

    pub fn run_flag(&self) -> watch::Receiver<bool> {
        self.run_flag.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }
}

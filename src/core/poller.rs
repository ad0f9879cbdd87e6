//! Fixed-interval reader of the progress document.
//!
//! The poller owns only its timer. It is driven by the coordinator, which
//! creates it when a run starts and drops it when the run flag clears, so a
//! tick can never be delivered outside a run.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::core::models::BackupProgress;
use crate::logging::LogThrottle;
use crate::store::StateStore;

/// Default interval between progress reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// One poll result. `progress` is None when the document was absent or
/// unreadable on this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressTick {
    pub seq: u64,
    pub progress: Option<BackupProgress>,
}

pub struct ProgressPoller {
    store: StateStore,
    interval: Interval,
    run_flag: watch::Receiver<bool>,
    seq: u64,
    throttle: LogThrottle,
}

impl ProgressPoller {
    /// Start polling. The first read happens one `period` from now.
    pub fn start(store: StateStore, period: Duration, run_flag: watch::Receiver<bool>) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            store,
            interval,
            run_flag,
            seq: 0,
            throttle: LogThrottle::new(Duration::from_secs(10)),
        }
    }

    /// Wait for the next tick and read the progress document.
    ///
    /// Returns None, without reading, once the run flag is down; the caller
    /// should drop the poller at that point.
    pub async fn tick(&mut self) -> Option<ProgressTick> {
        if !*self.run_flag.borrow() {
            return None;
        }

        tokio::select! {
            _ = self.interval.tick() => {}
            _ = self.run_flag.wait_for(|running| !running) => return None,
        }

        if !*self.run_flag.borrow() {
            return None;
        }

        let progress = self.store.load::<BackupProgress>();
        self.seq += 1;

        if let Some(suppressed) = self.throttle.admit() {
            debug!(
                seq = self.seq,
                suppressed,
                phase = ?progress.as_ref().map(|p| p.phase),
                percent = ?progress.as_ref().and_then(|p| p.percent()),
                "Progress tick"
            );
        }

        Some(ProgressTick {
            seq: self.seq,
            progress,
        })
    }
}

//! Logging and tracing initialization.
//!
//! Diagnostics go to stderr through `tracing`, either as pretty console
//! output or as JSON. Stdout is left to command output.

use std::io::IsTerminal;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// One JSON object per event instead of pretty lines.
    pub json: bool,
    /// Default level DEBUG instead of INFO.
    pub verbose: bool,
}

impl From<&AppConfig> for LogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            json: config.json_logs,
            verbose: config.verbose,
        }
    }
}

/// Default filter when `RUST_LOG` is unset: our crate only.
fn default_directive(verbose: bool) -> String {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    format!("folder_sync={}", level.as_str().to_lowercase())
}

/// Install the global subscriber. Call once, after settings are resolved.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config.verbose)));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(false),
            )
            .init();
    }
}

/// Lets one log line through per window and counts the ones it held back.
///
/// Owned by a single poller, so no synchronisation. Uses tokio's clock so it
/// follows paused time in tests.
pub struct LogThrottle {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(n)` if this event should be logged, `n` being how many were
    /// dropped since the last one.
    pub fn admit(&mut self) -> Option<u64> {
        let now = Instant::now();
        let open = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.window);

        if open {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folder_sync::adapters::SchedulerKind;
use folder_sync::context::AppContext;
use folder_sync::core::{
    BackupConfig, BackupProgress, BackupStatus, ProgressView, RunMode, StatusReport, Supervisor,
    SupervisorEvent, SupervisorHandle,
};
use folder_sync::logging::{self, LogConfig};
use folder_sync::{config, service};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "folder-sync")]
#[command(about = "Scheduled folder sync supervisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    job_script: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true, value_enum)]
    scheduler: Option<SchedulerKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,

    /// Install schedules into the simulated scheduler
    #[serde(skip)]
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    simulation: Option<bool>,
}

impl Overrides {
    /// Fold `--simulation` into the scheduler choice.
    fn resolve(mut self) -> Self {
        if self.simulation == Some(true) {
            self.scheduler = Some(SchedulerKind::Simulated);
        }
        self
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync job once and follow its progress
    Run {
        /// Full copy, skipping the analysis phase
        #[arg(long)]
        full: bool,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Long-lived supervisor driven by line commands on stdin
    Daemon {
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show the last run and the schedule
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show or edit the recurring schedule
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// Check that the job can access the destination volume
    Probe {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ScheduleCommand {
    Show,
    Set(ScheduleArgs),
}

#[derive(Args)]
struct ScheduleArgs {
    #[arg(long)]
    hour: Option<u8>,
    #[arg(long)]
    minute: Option<u8>,
    /// Comma-separated weekdays, 0 = Sunday. Pass an empty value for every day.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    days: Option<Vec<u8>>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    destination: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = cli.overrides.resolve();
    let config = config::AppConfig::new(cli.settings.as_deref(), Some(&overrides))
        .context("Failed to load settings")?;
    logging::init(LogConfig::from(&config));

    let ctx = AppContext::new(config);

    match cli.command {
        Commands::Run { full, json } => run_once(ctx, mode(full), json)
            .await
            .context("Sync run failed")?,
        Commands::Daemon { json } => run_daemon(ctx, json).await.context("Daemon failed")?,
        Commands::Status { json } => print_status(&ctx, json)?,
        Commands::Schedule(ScheduleCommand::Show) => show_schedule(&ctx),
        Commands::Schedule(ScheduleCommand::Set(args)) => set_schedule(ctx, args)
            .await
            .context("Failed to save schedule")?,
        Commands::Probe { json } => probe(ctx, json).await?,
    }

    Ok(())
}

fn mode(full: bool) -> RunMode {
    if full { RunMode::Full } else { RunMode::Default }
}

fn spawn_supervisor(ctx: &AppContext) -> (SupervisorHandle, tokio::task::JoinHandle<()>) {
    Supervisor::spawn(ctx.store.clone(), ctx.launcher(), ctx.config.poll_interval())
}

async fn run_once(ctx: AppContext, mode: RunMode, json: bool) -> Result<()> {
    let (handle, task) = spawn_supervisor(&ctx);
    let mut events = handle.subscribe();

    handle.run_now(mode).await?;
    drop(handle);

    loop {
        match events.recv().await {
            Ok(event) => {
                let finished = matches!(event, SupervisorEvent::RunFinished { .. });
                print_event(&event, json);
                if finished {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Missed events"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    task.await.context("Supervisor task panicked")?;
    Ok(())
}

async fn run_daemon(ctx: AppContext, json: bool) -> Result<()> {
    let (handle, task) = spawn_supervisor(&ctx);
    let shutdown = CancellationToken::new();

    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });

    info!(data_dir = %ctx.store.dir().display(), "Daemon ready: commands are run, full, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "run" => handle.run_now(RunMode::Default).await?,
            "full" => handle.run_now(RunMode::Full).await?,
            "status" => {
                let report = build_report(&ctx, handle.is_running());
                for line in report.lines() {
                    println!("{}", line);
                }
            }
            "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown command '{}'. Use: run, full, status, quit", other),
        }
    }

    if handle.is_running() {
        info!("Waiting for the running job to finish");
    }
    drop(handle);
    task.await.context("Supervisor task panicked")?;
    let _ = printer.await;
    Ok(())
}

fn print_event(event: &SupervisorEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Could not encode event"),
        }
        return;
    }

    match event {
        SupervisorEvent::RunStarted { run_id, mode, .. } => {
            println!("Backup started ({} run, id {})", mode, run_id);
        }
        SupervisorEvent::Progress { tick, .. } => {
            let view = ProgressView::from_progress(true, tick.progress.as_ref());
            if let Some(label) = view.label() {
                match view.bar() {
                    Some(bar) => println!("{}  {}", bar, label),
                    None => println!("{}", label),
                }
            }
        }
        SupervisorEvent::RunFinished {
            exit,
            duration_secs,
            status,
            ..
        } => {
            println!("Backup finished after {}s: {}", duration_secs, exit);
            match status {
                Some(s) => println!(
                    "Status:  {}  |  Files: {}  |  Size: {}",
                    s.status.indicator(),
                    s.files_transferred,
                    s.total_size
                ),
                None => println!("No status reported by the job"),
            }
        }
    }
}

fn build_report(ctx: &AppContext, running: bool) -> StatusReport {
    let config = ctx.store.load::<BackupConfig>();
    let status = ctx.store.load::<BackupStatus>();
    let progress = ctx.store.load::<BackupProgress>();
    StatusReport::build(config.as_ref(), status.as_ref(), running, progress.as_ref())
}

fn print_status(ctx: &AppContext, json: bool) -> Result<()> {
    // Another process owns the run flag; from here we can only report idle.
    let report = build_report(ctx, false);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.lines() {
            println!("{}", line);
        }
        println!("Log:  {}", ctx.config.log_file.display());
    }
    Ok(())
}

fn show_schedule(ctx: &AppContext) {
    let config = service::current_config(ctx);
    let backend = ctx.scheduler();
    let descriptor = service::compiler(ctx, backend.as_ref()).compile(&config);

    println!("Schedule:  {}", folder_sync::core::report::schedule_line(&config));
    println!("Source:       {}", config.source);
    println!("Destination:  {}", config.destination);
    for (path, content) in &descriptor.files {
        println!("\n# {}\n{}", path.display(), content);
    }
}

async fn set_schedule(ctx: AppContext, args: ScheduleArgs) -> Result<()> {
    let edit = service::ScheduleEdit {
        hour: args.hour,
        minute: args.minute,
        days: args.days,
        source: args.source,
        destination: args.destination,
    };

    let (config, descriptor) = tokio::task::spawn_blocking(move || {
        let backend = ctx.scheduler();
        service::save_schedule(&ctx, backend.as_ref(), &edit)
    })
    .await??;

    println!("Schedule:  {}", folder_sync::core::report::schedule_line(&config));
    for (path, _) in &descriptor.files {
        println!("Installed {}", path.display());
    }
    Ok(())
}

async fn probe(ctx: AppContext, json: bool) -> Result<()> {
    let destination = service::current_config(&ctx).destination;
    let access = tokio::task::spawn_blocking({
        let prober = ctx.prober();
        let destination = destination.clone();
        move || prober.check(&destination)
    })
    .await?;

    if json {
        let report = serde_json::json!({ "destination": destination, "access": access });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if access.needs_permissions() {
        println!(
            "No disk access for {}: grant full disk access to {} and {}",
            destination,
            ctx.config
                .interpreter
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ctx.config.job_script.display().to_string()),
            ctx.config.probe_program.display()
        );
    } else {
        println!("Disk access OK ({:?})", access);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(args: &[&str]) -> Overrides {
        let argv = ["folder-sync"].iter().chain(args).copied();
        Cli::try_parse_from(argv).unwrap().overrides.resolve()
    }

    #[test]
    fn test_simulation_flag_selects_simulated_scheduler() {
        assert_eq!(
            overrides(&["status", "--simulation"]).scheduler,
            Some(SchedulerKind::Simulated)
        );
        assert_eq!(
            overrides(&["--simulation", "true", "probe"]).scheduler,
            Some(SchedulerKind::Simulated)
        );
    }

    #[test]
    fn test_simulation_false_keeps_explicit_scheduler() {
        let resolved = overrides(&["status", "--simulation", "false", "--scheduler", "launchd"]);
        assert_eq!(resolved.scheduler, Some(SchedulerKind::Launchd));
        assert!(overrides(&["status"]).scheduler.is_none());
    }

    #[test]
    fn test_simulation_is_not_a_settings_key() {
        let value = serde_json::to_value(overrides(&["status", "--simulation"])).unwrap();
        assert_eq!(value, serde_json::json!({ "scheduler": "simulated" }));
    }
}

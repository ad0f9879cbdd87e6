use std::path::PathBuf;

use crate::adapters::{SchedulerBackend, run_command};
use crate::core::schedule::{Descriptor, ScheduleSpec, Trigger};
use crate::error::ScheduleError;

const SYSTEMCTL: &str = "systemctl";

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const SERVICE_TEMPLATE: &str = r#"[Unit]
Description=Folder sync job ({label})

[Service]
Type=oneshot
ExecStart={exec_start}
StandardError=append:{stderr_log}
"#;

const TIMER_TEMPLATE: &str = r#"[Unit]
Description=Folder sync schedule ({label})

[Timer]
{on_calendar}Persistent=false

[Install]
WantedBy=timers.target
"#;

/// systemd user timer scheduler (`~/.config/systemd/user/<label>.{service,timer}`).
pub struct SystemdScheduler {
    unit_dir: PathBuf,
}

impl SystemdScheduler {
    pub fn new(unit_dir: PathBuf) -> Self {
        Self { unit_dir }
    }

    fn systemctl(&self, args: &[&str]) -> Result<Result<(), String>, ScheduleError> {
        let mut full = vec!["--user"];
        full.extend_from_slice(args);

        let status = run_command(SYSTEMCTL, &full)?;
        if status.success() {
            Ok(Ok(()))
        } else {
            Ok(Err(status.to_string()))
        }
    }
}

impl SchedulerBackend for SystemdScheduler {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn render(&self, spec: &ScheduleSpec) -> Descriptor {
        let exec_start = spec
            .program_arguments
            .iter()
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ");

        let service = SERVICE_TEMPLATE
            .replace("{label}", &escape_specifiers(&spec.label))
            .replace("{exec_start}", &exec_start)
            .replace(
                "{stderr_log}",
                &escape_specifiers(&spec.stderr_log.display().to_string()),
            );

        let on_calendar: String = spec
            .triggers
            .iter()
            .map(|t| format!("OnCalendar={}\n", on_calendar(t)))
            .collect();

        let timer = TIMER_TEMPLATE
            .replace("{label}", &escape_specifiers(&spec.label))
            .replace("{on_calendar}", &on_calendar);

        Descriptor {
            files: vec![
                (self.unit_dir.join(format!("{}.service", spec.label)), service),
                (self.unit_dir.join(format!("{}.timer", spec.label)), timer),
            ],
        }
    }

    fn unload(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        let timer = format!("{}.timer", spec.label);
        self.systemctl(&["disable", "--now", &timer])?
            .map_err(|status| ScheduleError::Install {
                command: format!("{} --user disable --now {}", SYSTEMCTL, timer),
                status,
            })
    }

    fn load(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        self.systemctl(&["daemon-reload"])?
            .map_err(|status| ScheduleError::Install {
                command: format!("{} --user daemon-reload", SYSTEMCTL),
                status,
            })?;

        let timer = format!("{}.timer", spec.label);
        self.systemctl(&["enable", "--now", &timer])?
            .map_err(|status| ScheduleError::Activate {
                command: format!("{} --user enable --now {}", SYSTEMCTL, timer),
                status,
            })
    }
}

fn on_calendar(trigger: &Trigger) -> String {
    let time = format!("{:02}:{:02}:00", trigger.hour, trigger.minute);
    match trigger.weekday {
        Some(day) => {
            let name = WEEKDAYS.get(day as usize).copied().unwrap_or("*");
            format!("{} *-*-* {}", name, time)
        }
        None => format!("*-*-* {}", time),
    }
}

/// `%` starts a unit specifier in every unit file value.
fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

/// One `ExecStart=` word: specifiers and `$` expansion escaped, quoted if needed.
fn quote(arg: &str) -> String {
    let arg = escape_specifiers(arg).replace('$', "$$");
    if arg.contains(char::is_whitespace) || arg.contains('"') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg
    }
}

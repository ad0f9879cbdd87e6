use std::fmt::Write as _;
use std::path::PathBuf;

use crate::adapters::{SchedulerBackend, run_command};
use crate::core::schedule::{Descriptor, ScheduleSpec, Trigger};
use crate::error::ScheduleError;

const LAUNCHCTL: &str = "/bin/launchctl";

/// macOS LaunchAgent scheduler (`~/Library/LaunchAgents/<label>.plist`).
pub struct LaunchdScheduler {
    agents_dir: PathBuf,
}

impl LaunchdScheduler {
    pub fn new(agents_dir: PathBuf) -> Self {
        Self { agents_dir }
    }

    fn plist_path(&self, label: &str) -> PathBuf {
        self.agents_dir.join(format!("{}.plist", label))
    }

    fn launchctl(&self, verb: &str, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        let path = self.plist_path(&spec.label).display().to_string();
        let status = run_command(LAUNCHCTL, &[verb, &path])?;

        if status.success() {
            return Ok(());
        }

        let command = format!("{} {} {}", LAUNCHCTL, verb, path);
        let status = status.to_string();
        Err(if verb == "load" {
            ScheduleError::Activate { command, status }
        } else {
            ScheduleError::Install { command, status }
        })
    }
}

impl SchedulerBackend for LaunchdScheduler {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn render(&self, spec: &ScheduleSpec) -> Descriptor {
        Descriptor {
            files: vec![(self.plist_path(&spec.label), render_plist(spec))],
        }
    }

    fn unload(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        self.launchctl("unload", spec)
    }

    fn load(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        self.launchctl("load", spec)
    }
}

fn render_plist(spec: &ScheduleSpec) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(
        "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
         \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    );
    out.push_str("<plist version=\"1.0\">\n<dict>\n");

    let _ = writeln!(out, "    <key>Label</key>\n    <string>{}</string>", escape(&spec.label));

    out.push_str("    <key>ProgramArguments</key>\n    <array>\n");
    for arg in &spec.program_arguments {
        let _ = writeln!(out, "        <string>{}</string>", escape(arg));
    }
    out.push_str("    </array>\n");

    out.push_str("    <key>StartCalendarInterval</key>\n");
    match spec.triggers.as_slice() {
        [single] if single.weekday.is_none() => push_trigger(&mut out, single, 1),
        triggers => {
            out.push_str("    <array>\n");
            for trigger in triggers {
                push_trigger(&mut out, trigger, 2);
            }
            out.push_str("    </array>\n");
        }
    }

    let _ = writeln!(
        out,
        "    <key>StandardErrorPath</key>\n    <string>{}</string>",
        escape(&spec.stderr_log.display().to_string())
    );
    out.push_str("</dict>\n</plist>\n");
    out
}

fn push_trigger(out: &mut String, trigger: &Trigger, depth: usize) {
    let pad = "    ".repeat(depth);
    let _ = writeln!(out, "{pad}<dict>");
    if let Some(day) = trigger.weekday {
        let _ = writeln!(out, "{pad}    <key>Weekday</key>\n{pad}    <integer>{day}</integer>");
    }
    let _ = writeln!(
        out,
        "{pad}    <key>Hour</key>\n{pad}    <integer>{}</integer>",
        trigger.hour
    );
    let _ = writeln!(
        out,
        "{pad}    <key>Minute</key>\n{pad}    <integer>{}</integer>",
        trigger.minute
    );
    let _ = writeln!(out, "{pad}</dict>");
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub mod job;
pub mod models;
pub mod poller;
pub mod probe;
pub mod report;
pub mod schedule;
pub mod supervisor;

pub use job::{JobExit, JobInvocation, JobLauncher, ProcessLauncher, RunMode};
pub use models::{BackupConfig, BackupProgress, BackupStatus, Phase, RunOutcome};
pub use poller::{ProgressPoller, ProgressTick};
pub use probe::{Access, CapabilityProber};
pub use report::{ProgressView, StatusReport};
pub use schedule::{Descriptor, ScheduleCompiler, Trigger, compile_triggers};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorHandle};

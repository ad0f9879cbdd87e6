use std::sync::Arc;

use crate::adapters::{SchedulerBackend, get_scheduler};
use crate::config::AppConfig;
use crate::core::job::{JobLauncher, ProcessLauncher};
use crate::core::probe::CapabilityProber;
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: StateStore,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let store = StateStore::new(config.data_dir.clone());
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn scheduler(&self) -> Box<dyn SchedulerBackend> {
        get_scheduler(self.config.scheduler, self.config.descriptor_dir())
    }

    pub fn launcher(&self) -> Arc<dyn JobLauncher> {
        Arc::new(ProcessLauncher::new(self.config.invocation()))
    }

    pub fn prober(&self) -> CapabilityProber {
        CapabilityProber::new(self.config.probe_program.clone())
    }
}

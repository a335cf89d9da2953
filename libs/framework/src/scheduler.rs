//! Single scheduling cycle: open, run the actions, close.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::action::{Action, ActionRegistry};
use crate::cache::Cache;
use crate::conf::{SchedulerConfiguration, Tier};
use crate::error::ConfigError;
use crate::plugin::PluginBuilders;
use crate::session::Session;

/// Statistics from one scheduling cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub jobs: usize,
    pub nodes: usize,
    pub jobs_updated: usize,
    pub jobs_failed: usize,
    pub status_events: usize,
    pub warnings: usize,
}

/// Runs configured actions over a fresh session per cycle.
pub struct Scheduler {
    cache: Arc<dyn Cache>,
    actions: Vec<Arc<dyn Action>>,
    tiers: Vec<Tier>,
    plugins: PluginBuilders,
}

impl Scheduler {
    /// Resolves the configured action names up front so a bad configuration
    /// fails at startup rather than mid-cycle.
    pub fn new(
        cache: Arc<dyn Cache>,
        conf: SchedulerConfiguration,
        actions: &ActionRegistry,
        plugins: PluginBuilders,
    ) -> Result<Self, ConfigError> {
        let actions = actions.resolve(&conf.actions)?;
        Ok(Self {
            cache,
            actions,
            tiers: conf.tiers,
            plugins,
        })
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Runs one cycle. Plugins are built fresh for every session.
    #[instrument(skip(self))]
    pub fn run_once(&self) -> CycleStats {
        for action in &self.actions {
            action.initialize();
        }

        let registry = self.plugins.build_registry(&self.tiers);
        let mut ssn = Session::open(Arc::clone(&self.cache), registry);
        let jobs = ssn.jobs().len();
        let nodes = ssn.nodes().len();

        for action in &self.actions {
            debug!(session_uid = %ssn.uid(), action = action.name(), "Executing action");
            action.execute(&mut ssn);
        }

        let summary = ssn.close();

        for action in &self.actions {
            action.uninitialize();
        }

        let stats = CycleStats {
            jobs,
            nodes,
            jobs_updated: summary.jobs_updated,
            jobs_failed: summary.jobs_failed,
            status_events: summary.status_events,
            warnings: summary.warnings.len(),
        };
        if stats.jobs_failed > 0 || stats.warnings > 0 {
            info!(
                session_uid = %summary.session_uid,
                jobs = stats.jobs,
                jobs_failed = stats.jobs_failed,
                warnings = stats.warnings,
                "Scheduling cycle finished with problems"
            );
        }
        stats
    }
}

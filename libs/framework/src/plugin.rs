//! Plugin contract and plugin factories.
//!
//! A plugin contributes policy functions to a session by overriding the
//! matching [`Plugin`] methods. Every policy method returns `None` by
//! default, which the registry reads as "no opinion": the plugin simply has
//! not registered that kind of function.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::api::{JobInfo, NodeInfo, PredicateError, QueueInfo, TaskInfo, ValidateResult};
use crate::conf::Tier;
use crate::registry::PolicyRegistry;
use crate::session::Session;

/// A scheduling policy plugin.
///
/// A fresh instance is built for each session. State the plugin derives in
/// [`Plugin::on_session_open`] must sit behind interior mutability because
/// policy methods take `&self`.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once the session has indexed its snapshot and dropped invalid
    /// jobs. Event handlers are registered here.
    fn on_session_open(&self, _ssn: &mut Session) {}

    /// Called before the session reconciles and persists job status.
    fn on_session_close(&self, _ssn: &Session) {}

    fn job_order(&self, _l: &JobInfo, _r: &JobInfo) -> Option<Ordering> {
        None
    }

    fn queue_order(&self, _l: &QueueInfo, _r: &QueueInfo) -> Option<Ordering> {
        None
    }

    fn task_order(&self, _l: &TaskInfo, _r: &TaskInfo) -> Option<Ordering> {
        None
    }

    /// Whether `task` may be placed on `node`.
    fn predicate(&self, _task: &TaskInfo, _node: &NodeInfo) -> Option<Result<(), PredicateError>> {
        None
    }

    /// Whether `preemptor` may preempt `preemptee`.
    fn preemptable(&self, _preemptor: &TaskInfo, _preemptee: &TaskInfo) -> Option<bool> {
        None
    }

    /// Whether `reclaimee` must yield its resources to `reclaimer`.
    fn reclaimable(&self, _reclaimer: &TaskInfo, _reclaimee: &TaskInfo) -> Option<bool> {
        None
    }

    /// Whether the queue uses more than its share.
    fn overused(&self, _queue: &QueueInfo) -> Option<bool> {
        None
    }

    /// Whether enough of the job is placed for it to run.
    fn job_ready(&self, _job: &JobInfo) -> Option<bool> {
        None
    }

    /// Whether the job may be scheduled at all this cycle.
    fn job_valid(&self, _job: &JobInfo) -> Option<ValidateResult> {
        None
    }
}

/// Free-form arguments configured for a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginArguments(BTreeMap<String, String>);

impl PluginArguments {
    pub fn new(args: BTreeMap<String, String>) -> Self {
        Self(args)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parses an argument; a present but malformed value is logged and ignored.
    pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.0.get(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = %raw, "Ignoring malformed plugin argument");
                None
            }
        }
    }
}

pub type PluginBuilder = Box<dyn Fn(&PluginArguments) -> Arc<dyn Plugin> + Send + Sync>;

/// Named plugin factories.
#[derive(Default)]
pub struct PluginBuilders {
    builders: BTreeMap<String, PluginBuilder>,
}

impl PluginBuilders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any earlier one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&PluginArguments) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Builds fresh plugin instances for every configured tier entry, in
    /// tier order. Unknown names are skipped with a warning.
    pub fn build_registry(&self, tiers: &[Tier]) -> PolicyRegistry {
        let mut registry = PolicyRegistry::new();
        for (tier, option) in tiers
            .iter()
            .enumerate()
            .flat_map(|(i, t)| t.plugins.iter().map(move |p| (i, p)))
        {
            let Some(builder) = self.builders.get(&option.name) else {
                warn!(plugin = %option.name, tier, "Failed to find plugin builder; skipping");
                continue;
            };
            let plugin = builder(&PluginArguments::new(option.arguments.clone()));
            registry.register_with(plugin, option.clone());
        }
        registry
    }
}

impl std::fmt::Debug for PluginBuilders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.builders.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::PluginOption;

    struct Named(String);

    impl Plugin for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    fn builders() -> PluginBuilders {
        let mut builders = PluginBuilders::new();
        for name in ["priority", "gang", "proportion"] {
            builders.register(name, move |_: &PluginArguments| {
                Arc::new(Named(name.to_string())) as Arc<dyn Plugin>
            });
        }
        builders
    }

    #[test]
    fn test_build_registry_follows_tier_order() {
        let tiers = vec![
            Tier {
                plugins: vec![PluginOption::new("gang"), PluginOption::new("priority")],
            },
            Tier {
                plugins: vec![PluginOption::new("missing"), PluginOption::new("proportion")],
            },
        ];

        let registry = builders().build_registry(&tiers);

        assert_eq!(registry.plugin_names(), vec!["gang", "priority", "proportion"]);
        assert!(builders().contains("gang"));
        assert!(!builders().contains("missing"));
    }

    #[test]
    fn test_plugin_arguments() {
        let args = PluginArguments::new(BTreeMap::from([
            ("weight".to_string(), "3".to_string()),
            ("ratio".to_string(), "half".to_string()),
        ]));

        assert_eq!(args.get::<u32>("weight"), Some(3));
        assert_eq!(args.get::<f64>("ratio"), None);
        assert_eq!(args.get_str("ratio"), Some("half"));
        assert_eq!(args.get::<u32>("absent"), None);
    }
}

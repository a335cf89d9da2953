//! The policy registry: plugins in registration order, folded per policy kind.
//!
//! | kind | fold | nobody registered |
//! |------|------|-------------------|
//! | job / queue / task order | first non-`Equal` answer wins | `Equal` |
//! | predicate | first failure wins | pass |
//! | preemptable / reclaimable | AND over every opinion | not evictable |
//! | overused | overused if any plugin says so | not overused |
//! | job ready | AND | ready |
//! | job valid | first failing result wins | valid |
//!
//! The registry only grows; nothing is unregistered during a cycle.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::api::{JobInfo, NodeInfo, PredicateError, QueueInfo, TaskInfo, ValidateResult};
use crate::conf::{PluginOption, PolicyKind};
use crate::plugin::Plugin;

struct Registered {
    plugin: Arc<dyn Plugin>,
    option: PluginOption,
}

#[derive(Default)]
pub struct PolicyRegistry {
    entries: Vec<Registered>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin with every policy kind enabled.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let option = PluginOption::new(plugin.name());
        self.register_with(plugin, option);
    }

    /// Registers a plugin, masking the policy kinds `option` disables.
    pub fn register_with(&mut self, plugin: Arc<dyn Plugin>, option: PluginOption) {
        self.entries.push(Registered { plugin, option });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.plugin.name()).collect()
    }

    /// Registered plugins, cloned out so callers may hand the session to them.
    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.entries.iter().map(|e| Arc::clone(&e.plugin)).collect()
    }

    fn enabled(&self, kind: PolicyKind) -> impl Iterator<Item = &dyn Plugin> {
        self.entries
            .iter()
            .filter(move |e| e.option.enabled(kind))
            .map(|e| e.plugin.as_ref())
    }

    pub fn job_order(&self, l: &JobInfo, r: &JobInfo) -> Ordering {
        first_decisive(self.enabled(PolicyKind::JobOrder).map(|p| p.job_order(l, r)))
    }

    pub fn queue_order(&self, l: &QueueInfo, r: &QueueInfo) -> Ordering {
        first_decisive(self.enabled(PolicyKind::QueueOrder).map(|p| p.queue_order(l, r)))
    }

    pub fn task_order(&self, l: &TaskInfo, r: &TaskInfo) -> Ordering {
        first_decisive(self.enabled(PolicyKind::TaskOrder).map(|p| p.task_order(l, r)))
    }

    pub fn predicate(&self, task: &TaskInfo, node: &NodeInfo) -> Result<(), PredicateError> {
        self.enabled(PolicyKind::Predicate)
            .filter_map(|p| p.predicate(task, node))
            .find(Result::is_err)
            .unwrap_or(Ok(()))
    }

    pub fn preemptable(&self, preemptor: &TaskInfo, preemptee: &TaskInfo) -> bool {
        all_agree(
            self.enabled(PolicyKind::Preemptable)
                .map(|p| p.preemptable(preemptor, preemptee)),
        )
    }

    pub fn reclaimable(&self, reclaimer: &TaskInfo, reclaimee: &TaskInfo) -> bool {
        all_agree(
            self.enabled(PolicyKind::Reclaimable)
                .map(|p| p.reclaimable(reclaimer, reclaimee)),
        )
    }

    pub fn overused(&self, queue: &QueueInfo) -> bool {
        self.enabled(PolicyKind::Overused)
            .filter_map(|p| p.overused(queue))
            .any(|overused| overused)
    }

    pub fn job_ready(&self, job: &JobInfo) -> bool {
        self.enabled(PolicyKind::JobReady)
            .filter_map(|p| p.job_ready(job))
            .all(|ready| ready)
    }

    /// The first failing validity result, or `None` when the job is valid.
    pub fn job_valid(&self, job: &JobInfo) -> Option<ValidateResult> {
        self.enabled(PolicyKind::JobValid)
            .filter_map(|p| p.job_valid(job))
            .find(|r| !r.pass)
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugin_names()).finish()
    }
}

fn first_decisive(answers: impl Iterator<Item = Option<Ordering>>) -> Ordering {
    answers
        .flatten()
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// AND over the opinions given; `false` when nobody gave one.
fn all_agree(opinions: impl Iterator<Item = Option<bool>>) -> bool {
    let mut seen = false;
    for opinion in opinions.flatten() {
        if !opinion {
            return false;
        }
        seen = true;
    }
    seen
}

//! Scheduling actions: the passes that drive a session's primitives.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::session::Session;

/// One pass over an open session (allocate, preempt, backfill, ...).
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// Called before the session is opened.
    fn initialize(&self) {}

    fn execute(&self, ssn: &mut Session);

    /// Called after the session is closed.
    fn uninitialize(&self) {}
}

/// Actions known to the scheduler, by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under its own name, replacing any earlier one.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Looks up the configured actions, in order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Action>>, ConfigError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| ConfigError::UnknownAction(name.clone()))
            })
            .collect()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}

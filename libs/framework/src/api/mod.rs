//! Entity model: the plain data a session schedules over.

mod job;
mod node;
mod queue;
mod resource;
mod snapshot;
mod task;

pub use job::{
    ConditionKind, ConditionStatus, GangGroup, GangStatus, JobCondition, JobError, JobInfo,
    JobPhase,
};
pub use node::{NodeError, NodeInfo};
pub use queue::QueueInfo;
pub use resource::Resource;
pub use snapshot::ClusterSnapshot;
pub use task::{TaskInfo, TaskStatus};

/// Outcome of a job validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateResult {
    pub pass: bool,
    pub reason: String,
    pub message: String,
}

impl ValidateResult {
    pub fn pass() -> Self {
        Self {
            pass: true,
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Why a task does not fit a node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{plugin}: {reason}")]
pub struct PredicateError {
    pub plugin: String,
    pub reason: String,
}

impl PredicateError {
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

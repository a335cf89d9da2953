//! Tasks and their lifecycle states.

use std::fmt;

use gangplank_id::{JobId, TaskId};
use serde::{Deserialize, Serialize};

use super::Resource;

/// Lifecycle state of a task.
///
/// ```text
/// Pending -> Pipelined -> Allocated | AllocatedOverBackfill -> Binding -> Running -> Succeeded | Failed
///                         (any placed task) -> Releasing -> Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// Tentatively placed onto capacity that is still being released.
    Pipelined,
    Allocated,
    /// Allocated onto spare capacity held back for another job's gang.
    AllocatedOverBackfill,
    /// Bind requested from the platform.
    Binding,
    Running,
    /// Eviction requested; capacity not yet confirmed free.
    Releasing,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Resources for this task are committed ("AllocatedStatus").
    pub fn is_allocated(self) -> bool {
        matches!(
            self,
            TaskStatus::Allocated
                | TaskStatus::AllocatedOverBackfill
                | TaskStatus::Binding
                | TaskStatus::Running
        )
    }

    /// The task is listed on its node and counted in the node's capacity.
    pub fn occupies_node(self) -> bool {
        self.is_allocated() || matches!(self, TaskStatus::Pipelined | TaskStatus::Releasing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Pipelined => "Pipelined",
            TaskStatus::Allocated => "Allocated",
            TaskStatus::AllocatedOverBackfill => "AllocatedOverBackfill",
            TaskStatus::Binding => "Binding",
            TaskStatus::Running => "Running",
            TaskStatus::Releasing => "Releasing",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// One schedulable unit of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub uid: TaskId,
    pub job: JobId,
    pub name: String,
    pub namespace: String,

    /// Node the task is placed on; empty until placed.
    #[serde(default)]
    pub node_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: i32,
    pub resreq: Resource,
}

impl TaskInfo {
    pub fn new(job: JobId, name: impl Into<String>, resreq: Resource) -> Self {
        Self {
            uid: TaskId::new(),
            job,
            name: name.into(),
            namespace: "default".to_string(),
            node_name: String::new(),
            status: TaskStatus::Pending,
            priority: 0,
            resreq,
        }
    }

    /// Places the task on `node` with the given status; used when building
    /// snapshots of already-running work.
    #[must_use]
    pub fn placed(mut self, node: impl Into<String>, status: TaskStatus) -> Self {
        self.node_name = node.into();
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task ({}:{}/{}): job {}, status {}, node '{}', pri {}, resreq {}",
            self.uid,
            self.namespace,
            self.name,
            self.job,
            self.status,
            self.node_name,
            self.priority,
            self.resreq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, false, false)]
    #[case(TaskStatus::Pipelined, false, true)]
    #[case(TaskStatus::Allocated, true, true)]
    #[case(TaskStatus::AllocatedOverBackfill, true, true)]
    #[case(TaskStatus::Binding, true, true)]
    #[case(TaskStatus::Running, true, true)]
    #[case(TaskStatus::Releasing, false, true)]
    #[case(TaskStatus::Succeeded, false, false)]
    #[case(TaskStatus::Failed, false, false)]
    fn test_status_predicates(
        #[case] status: TaskStatus,
        #[case] allocated: bool,
        #[case] on_node: bool,
    ) {
        assert_eq!(status.is_allocated(), allocated);
        assert_eq!(status.occupies_node(), on_node);
    }
}

//! Point-in-time cluster state handed to a session at open.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{JobInfo, NodeInfo, QueueInfo, TaskInfo};

/// Everything a session needs from the cache for one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub jobs: Vec<JobInfo>,
    pub nodes: Vec<NodeInfo>,
    pub queues: Vec<QueueInfo>,
    /// Tasks whose owning job is not part of the snapshot.
    #[serde(default)]
    pub others: Vec<TaskInfo>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeInfo) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: QueueInfo) -> Self {
        self.queues.push(queue);
        self
    }

    /// Adds a job and charges each of its placed tasks to the named node.
    /// Nodes must be added before the jobs that run on them.
    #[must_use]
    pub fn with_job(mut self, job: JobInfo) -> Self {
        for task in job.tasks().filter(|t| t.status.occupies_node()) {
            match self.nodes.iter_mut().find(|n| n.name == task.node_name) {
                Some(node) => {
                    if let Err(e) = node.add_task(task) {
                        warn!(task_id = %task.uid, node = %task.node_name, error = %e, "Snapshot task does not fit its node");
                    }
                }
                None => {
                    warn!(task_id = %task.uid, node = %task.node_name, "Snapshot task references unknown node");
                }
            }
        }
        self.jobs.push(job);
        self
    }

    #[must_use]
    pub fn with_orphan(mut self, task: TaskInfo) -> Self {
        self.others.push(task);
        self
    }
}

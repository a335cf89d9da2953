//! Nodes and their capacity accounting.

use std::collections::BTreeMap;
use std::fmt;

use gangplank_id::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Resource, TaskInfo, TaskStatus};

/// Node bookkeeping failures. A failed call leaves the node untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("task {task} already on node {node}")]
    AlreadyOnNode { node: String, task: TaskId },

    #[error("task {task} not on node {node}")]
    NotOnNode { node: String, task: TaskId },

    #[error("task {task} in status {status} cannot occupy node {node}")]
    NotPlaceable {
        node: String,
        task: TaskId,
        status: TaskStatus,
    },

    #[error("node {node} has insufficient {pool} capacity for task {task}")]
    InsufficientResources {
        node: String,
        task: TaskId,
        pool: &'static str,
    },
}

/// A node and the tasks placed on it.
///
/// Allocatable capacity is split three ways: `idle`, `used` and `releasing`
/// (held by tasks whose eviction has been requested but not yet confirmed).
/// The three always sum to `allocatable`. Each task is counted according to
/// the status the node last recorded for it:
///
/// | status       | counted in  |
/// |--------------|-------------|
/// | `Releasing`  | `releasing` |
/// | `Pipelined`  | `used`, taken out of `releasing` |
/// | other placed | `used`, taken out of `idle` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    allocatable: Resource,
    idle: Resource,
    used: Resource,
    releasing: Resource,
    tasks: BTreeMap<TaskId, TaskInfo>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, allocatable: Resource) -> Self {
        Self {
            name: name.into(),
            idle: allocatable.clone(),
            allocatable,
            used: Resource::default(),
            releasing: Resource::default(),
            tasks: BTreeMap::new(),
        }
    }

    pub fn allocatable(&self) -> &Resource {
        &self.allocatable
    }

    pub fn idle(&self) -> &Resource {
        &self.idle
    }

    pub fn used(&self) -> &Resource {
        &self.used
    }

    pub fn releasing(&self) -> &Resource {
        &self.releasing
    }

    /// Capacity that is free now or will be once releasing tasks are gone.
    pub fn future_idle(&self) -> Resource {
        let mut out = self.idle.clone();
        out.add(&self.releasing);
        out
    }

    /// `idle + used + releasing`; equals `allocatable` whenever the node is consistent.
    pub fn accounted(&self) -> Resource {
        let mut out = self.idle.clone();
        out.add(&self.used);
        out.add(&self.releasing);
        out
    }

    pub fn task(&self, uid: &TaskId) -> Option<&TaskInfo> {
        self.tasks.get(uid)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Records `task` on this node and charges its request to the pool its
    /// status draws from.
    pub fn add_task(&mut self, task: &TaskInfo) -> Result<(), NodeError> {
        if self.tasks.contains_key(&task.uid) {
            return Err(NodeError::AlreadyOnNode {
                node: self.name.clone(),
                task: task.uid,
            });
        }
        if !task.status.occupies_node() {
            return Err(NodeError::NotPlaceable {
                node: self.name.clone(),
                task: task.uid,
                status: task.status,
            });
        }

        let r = &task.resreq;
        match task.status {
            TaskStatus::Releasing => {
                self.idle = self.take(&self.idle, r, "idle", task)?;
                self.releasing.add(r);
            }
            TaskStatus::Pipelined => {
                self.releasing = self.take(&self.releasing, r, "releasing", task)?;
                self.used.add(r);
            }
            _ => {
                self.idle = self.take(&self.idle, r, "idle", task)?;
                self.used.add(r);
            }
        }

        let mut stored = task.clone();
        stored.node_name = self.name.clone();
        self.tasks.insert(task.uid, stored);
        Ok(())
    }

    /// Drops a task and returns its request to the pool it came from.
    pub fn remove_task(&mut self, uid: &TaskId) -> Result<TaskInfo, NodeError> {
        let Some(stored) = self.tasks.get(uid) else {
            return Err(NodeError::NotOnNode {
                node: self.name.clone(),
                task: *uid,
            });
        };

        let r = &stored.resreq;
        match stored.status {
            TaskStatus::Releasing => {
                self.releasing = self.take(&self.releasing, r, "releasing", stored)?;
                self.idle.add(r);
            }
            TaskStatus::Pipelined => {
                self.used = self.take(&self.used, r, "used", stored)?;
                self.releasing.add(r);
            }
            _ => {
                self.used = self.take(&self.used, r, "used", stored)?;
                self.idle.add(r);
            }
        }

        self.tasks.remove(uid).ok_or(NodeError::NotOnNode {
            node: self.name.clone(),
            task: *uid,
        })
    }

    /// Re-records a task whose status changed. On failure the previous record
    /// is restored.
    pub fn update_task(&mut self, task: &TaskInfo) -> Result<(), NodeError> {
        let old = self.remove_task(&task.uid)?;
        if let Err(e) = self.add_task(task) {
            // Putting back what was just removed cannot run short.
            let _ = self.add_task(&old);
            return Err(e);
        }
        Ok(())
    }

    fn take(
        &self,
        pool: &Resource,
        r: &Resource,
        pool_name: &'static str,
        task: &TaskInfo,
    ) -> Result<Resource, NodeError> {
        pool.checked_sub(r)
            .ok_or_else(|| NodeError::InsufficientResources {
                node: self.name.clone(),
                task: task.uid,
                pool: pool_name,
            })
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node ({}): idle <{}>, used <{}>, releasing <{}>",
            self.name, self.idle, self.used, self.releasing
        )?;
        for (i, task) in self.tasks.values().enumerate() {
            write!(f, "\n\t {}: {}", i, task)?;
        }
        Ok(())
    }
}

//! Jobs, gang specifications and the externally visible job status.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use gangplank_id::{JobId, QueueId, SessionId, TaskId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Resource, TaskInfo, TaskStatus};

/// Job bookkeeping failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("task {task} not found in job {job}")]
    TaskNotFound { job: JobId, task: TaskId },
}

/// Externally visible phase of a gang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Pending,
    Running,
    /// Running tasks exist although this cycle marked the job unschedulable.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Unschedulable,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A typed status condition; a job holds at most one per [`ConditionKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCondition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    /// Session that wrote the condition.
    pub transition_id: Option<SessionId>,
    pub last_transition_time: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

impl JobCondition {
    /// An `Unschedulable=True` condition stamped with `session`.
    pub fn unschedulable(
        session: SessionId,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: ConditionKind::Unschedulable,
            status: ConditionStatus::True,
            transition_id: Some(session),
            last_transition_time: Utc::now(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Status block persisted for gang jobs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GangStatus {
    pub phase: JobPhase,
    pub running: u32,
    pub failed: u32,
    pub succeeded: u32,
    #[serde(default)]
    pub conditions: Vec<JobCondition>,
}

impl GangStatus {
    /// Stores `cond` in the slot for its kind, replacing any older one.
    pub fn set_condition(&mut self, cond: JobCondition) {
        match self.conditions.iter_mut().find(|c| c.kind == cond.kind) {
            Some(slot) => *slot = cond,
            None => self.conditions.push(cond),
        }
    }

    pub fn condition(&self, kind: ConditionKind) -> Option<&JobCondition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

/// Gang-scheduling specification plus its status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GangGroup {
    pub min_member: u32,
    #[serde(default)]
    pub status: GangStatus,
}

impl GangGroup {
    pub fn new(min_member: u32) -> Self {
        Self {
            min_member,
            status: GangStatus::default(),
        }
    }
}

/// A job and the tasks it owns.
///
/// `tasks` is the only place a task's authoritative state lives inside a
/// session; `task_status_index` and `allocated` are derived from it and kept
/// in step by [`JobInfo::add_task`] and [`JobInfo::update_task_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub uid: JobId,
    pub namespace: String,
    pub name: String,
    pub queue: QueueId,
    #[serde(default)]
    pub priority: i32,
    pub creation_timestamp: DateTime<Utc>,

    /// `None` for jobs created without a gang specification.
    pub gang: Option<GangGroup>,

    tasks: BTreeMap<TaskId, TaskInfo>,
    task_status_index: BTreeMap<TaskStatus, BTreeSet<TaskId>>,
    allocated: Resource,
    total_request: Resource,
}

impl JobInfo {
    pub fn new(name: impl Into<String>, queue: QueueId, gang: Option<GangGroup>) -> Self {
        Self {
            uid: JobId::new(),
            namespace: "default".to_string(),
            name: name.into(),
            queue,
            priority: 0,
            creation_timestamp: Utc::now(),
            gang,
            tasks: BTreeMap::new(),
            task_status_index: BTreeMap::new(),
            allocated: Resource::default(),
            total_request: Resource::default(),
        }
    }

    /// Minimum number of tasks that must be placed together; zero without a gang.
    pub fn min_available(&self) -> u32 {
        self.gang.as_ref().map_or(0, |g| g.min_member)
    }

    /// Adds (or replaces) a task, indexing it under its current status.
    pub fn add_task(&mut self, mut task: TaskInfo) {
        task.job = self.uid;
        if let Some(old) = self.tasks.get(&task.uid).cloned() {
            self.unindex(&old);
        }
        self.index(&task);
        self.tasks.insert(task.uid, task);
    }

    pub fn task(&self, uid: &TaskId) -> Option<&TaskInfo> {
        self.tasks.get(uid)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    /// Tasks currently in `status`, in id order.
    pub fn tasks_with_status(&self, status: TaskStatus) -> impl Iterator<Item = &TaskInfo> {
        self.task_status_index
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|uid| self.tasks.get(uid))
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.task_status_index.get(&status).map_or(0, BTreeSet::len)
    }

    /// The per-status view of this job's tasks.
    pub fn task_status_index(&self) -> &BTreeMap<TaskStatus, BTreeSet<TaskId>> {
        &self.task_status_index
    }

    /// Number of tasks whose resources are committed.
    pub fn ready_task_num(&self) -> usize {
        self.task_status_index
            .iter()
            .filter(|(status, _)| status.is_allocated())
            .map(|(_, tasks)| tasks.len())
            .sum()
    }

    /// Resources held by tasks in an allocated status.
    pub fn allocated(&self) -> &Resource {
        &self.allocated
    }

    /// Resources requested by all tasks that have not finished.
    pub fn total_request(&self) -> &Resource {
        &self.total_request
    }

    /// Moves a task to `status`, keeping the status index and aggregates in step.
    pub fn update_task_status(&mut self, uid: &TaskId, status: TaskStatus) -> Result<(), JobError> {
        let Some(old) = self.tasks.get(uid).cloned() else {
            return Err(JobError::TaskNotFound {
                job: self.uid,
                task: *uid,
            });
        };
        self.unindex(&old);

        let mut task = old;
        task.status = status;
        self.index(&task);
        self.tasks.insert(*uid, task);
        Ok(())
    }

    /// Sets the node a task is placed on (empty string to unplace it).
    pub fn set_task_node(&mut self, uid: &TaskId, node: &str) -> Result<(), JobError> {
        let task = self.tasks.get_mut(uid).ok_or(JobError::TaskNotFound {
            job: self.uid,
            task: *uid,
        })?;
        task.node_name = node.to_string();
        Ok(())
    }

    fn index(&mut self, task: &TaskInfo) {
        self.task_status_index
            .entry(task.status)
            .or_default()
            .insert(task.uid);
        if task.status.is_allocated() {
            self.allocated.add(&task.resreq);
        }
        if !task.status.is_terminal() {
            self.total_request.add(&task.resreq);
        }
    }

    fn unindex(&mut self, task: &TaskInfo) {
        if let Some(set) = self.task_status_index.get_mut(&task.status) {
            set.remove(&task.uid);
            if set.is_empty() {
                self.task_status_index.remove(&task.status);
            }
        }
        if task.status.is_allocated() {
            if let Some(rest) = self.allocated.checked_sub(&task.resreq) {
                self.allocated = rest;
            }
        }
        if !task.status.is_terminal() {
            if let Some(rest) = self.total_request.checked_sub(&task.resreq) {
                self.total_request = rest;
            }
        }
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job ({}): namespace {}, name {}, min available {}, queue {}, priority {}",
            self.uid,
            self.namespace,
            self.name,
            self.min_available(),
            self.queue,
            self.priority
        )?;
        for task in self.tasks.values() {
            write!(f, "\n\t {}", task)?;
        }
        Ok(())
    }
}

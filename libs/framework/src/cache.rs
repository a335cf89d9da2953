//! Cluster state cache interface and an in-memory mock.
//!
//! The cache owns all communication with the cluster platform. A session
//! only ever pulls one snapshot from it and pushes placement, eviction and
//! status decisions back through it. Every call is synchronous and fallible;
//! retries and timeouts belong to the implementation.
//!
//! [`MockCache`] serves a fixed snapshot, journals every call and can be told
//! to fail individual tasks or jobs.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use gangplank_id::{JobId, TaskId};
use tracing::debug;

use crate::api::{ClusterSnapshot, JobInfo, TaskInfo};

/// Cluster state cache.
pub trait Cache: Send + Sync {
    /// Point-in-time copy of jobs, nodes, queues and unowned tasks.
    fn snapshot(&self) -> ClusterSnapshot;

    /// Reserves the task's volumes on `hostname`.
    fn allocate_volumes(&self, task: &TaskInfo, hostname: &str) -> Result<()>;

    /// Releases a reservation made by [`Cache::allocate_volumes`].
    fn revert_volumes(&self, _task: &TaskInfo) -> Result<()> {
        Ok(())
    }

    /// Binds the task's reserved volumes.
    fn bind_volumes(&self, task: &TaskInfo) -> Result<()>;

    /// Binds the task to `hostname` on the platform.
    fn bind(&self, task: &TaskInfo, hostname: &str) -> Result<()>;

    /// Asks the platform to evict the task. Completion is observed through a
    /// later snapshot.
    fn evict(&self, task: &TaskInfo, reason: &str) -> Result<()>;

    /// Persists the job's gang status.
    fn update_job_status(&self, job: &JobInfo) -> Result<JobInfo>;

    /// Records a status event for a job that has no gang status to persist.
    fn record_job_status_event(&self, job: &JobInfo);
}

/// Calls observed by a [`MockCache`].
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub allocated_volumes: Vec<(TaskId, String)>,
    pub reverted_volumes: Vec<TaskId>,
    pub bound_volumes: Vec<TaskId>,
    pub binds: Vec<(TaskId, String)>,
    pub evictions: Vec<(TaskId, String)>,
    pub status_updates: Vec<JobInfo>,
    pub status_events: Vec<JobId>,
}

#[derive(Debug, Default)]
struct Failures {
    allocate_volumes: BTreeSet<TaskId>,
    revert_volumes: BTreeSet<TaskId>,
    bind_volumes: BTreeSet<TaskId>,
    bind: BTreeSet<TaskId>,
    evict: BTreeSet<TaskId>,
    update_status: BTreeSet<JobId>,
}

/// In-memory cache for tests and dry runs.
#[derive(Debug, Default)]
pub struct MockCache {
    snapshot: Mutex<ClusterSnapshot>,
    failures: Mutex<Failures>,
    journal: Mutex<Journal>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCache {
    /// Create a mock cache serving `snapshot`.
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Replace the snapshot served to the next session.
    pub fn set_snapshot(&self, snapshot: ClusterSnapshot) {
        *lock(&self.snapshot) = snapshot;
    }

    pub fn fail_allocate_volumes(&self, task: TaskId) {
        lock(&self.failures).allocate_volumes.insert(task);
    }

    pub fn fail_revert_volumes(&self, task: TaskId) {
        lock(&self.failures).revert_volumes.insert(task);
    }

    pub fn fail_bind_volumes(&self, task: TaskId) {
        lock(&self.failures).bind_volumes.insert(task);
    }

    pub fn fail_bind(&self, task: TaskId) {
        lock(&self.failures).bind.insert(task);
    }

    pub fn fail_evict(&self, task: TaskId) {
        lock(&self.failures).evict.insert(task);
    }

    pub fn fail_update_status(&self, job: JobId) {
        lock(&self.failures).update_status.insert(job);
    }

    /// Copy of every call observed so far.
    pub fn journal(&self) -> Journal {
        lock(&self.journal).clone()
    }
}

impl Cache for MockCache {
    fn snapshot(&self) -> ClusterSnapshot {
        lock(&self.snapshot).clone()
    }

    fn allocate_volumes(&self, task: &TaskInfo, hostname: &str) -> Result<()> {
        if lock(&self.failures).allocate_volumes.contains(&task.uid) {
            bail!("[MOCK] volume reservation rejected for {}", task.uid);
        }
        lock(&self.journal)
            .allocated_volumes
            .push((task.uid, hostname.to_string()));
        Ok(())
    }

    fn revert_volumes(&self, task: &TaskInfo) -> Result<()> {
        if lock(&self.failures).revert_volumes.contains(&task.uid) {
            bail!("[MOCK] volume release rejected for {}", task.uid);
        }
        lock(&self.journal).reverted_volumes.push(task.uid);
        Ok(())
    }

    fn bind_volumes(&self, task: &TaskInfo) -> Result<()> {
        if lock(&self.failures).bind_volumes.contains(&task.uid) {
            bail!("[MOCK] volume bind rejected for {}", task.uid);
        }
        lock(&self.journal).bound_volumes.push(task.uid);
        Ok(())
    }

    fn bind(&self, task: &TaskInfo, hostname: &str) -> Result<()> {
        if lock(&self.failures).bind.contains(&task.uid) {
            bail!("[MOCK] bind rejected for {}", task.uid);
        }
        debug!(task_id = %task.uid, node = %hostname, "[MOCK] Binding task");
        lock(&self.journal)
            .binds
            .push((task.uid, hostname.to_string()));
        Ok(())
    }

    fn evict(&self, task: &TaskInfo, reason: &str) -> Result<()> {
        if lock(&self.failures).evict.contains(&task.uid) {
            bail!("[MOCK] eviction rejected for {}", task.uid);
        }
        debug!(task_id = %task.uid, reason, "[MOCK] Evicting task");
        lock(&self.journal)
            .evictions
            .push((task.uid, reason.to_string()));
        Ok(())
    }

    fn update_job_status(&self, job: &JobInfo) -> Result<JobInfo> {
        if lock(&self.failures).update_status.contains(&job.uid) {
            bail!("[MOCK] status update rejected for {}", job.uid);
        }
        lock(&self.journal).status_updates.push(job.clone());
        Ok(job.clone())
    }

    fn record_job_status_event(&self, job: &JobInfo) {
        lock(&self.journal).status_events.push(job.uid);
    }
}

//! The scheduling session: one cycle's working set and the primitives that
//! mutate it.
//!
//! A session is opened from a cache snapshot, driven serially by the
//! configured actions and closed once, at which point job status is
//! reconciled and persisted. Nothing here locks; serial use is the caller's
//! contract.
//!
//! Every task placement goes through [`Session::relocate`], which updates the
//! owning job and the affected nodes together or not at all. A failure there
//! is a bookkeeping inconsistency, not a collaborator failure: it is logged,
//! pushed to [`Session::warnings`] and the primitive carries on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use gangplank_id::{JobId, QueueId, SessionId, TaskId};
use tracing::{debug, error, info, warn};

use crate::api::{
    JobCondition, JobError, JobInfo, NodeInfo, PredicateError, QueueInfo, TaskInfo, TaskStatus,
    ValidateResult,
};
use crate::cache::Cache;
use crate::error::{SessionError, SessionResult, SessionWarning};
use crate::event::{Event, EventHandler};
use crate::registry::PolicyRegistry;
use crate::statement::Statement;
use crate::status::job_status;

/// What happened when a session was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSummary {
    pub session_uid: SessionId,
    /// Gang jobs whose status was persisted.
    pub jobs_updated: usize,
    /// Gang jobs whose status could not be persisted.
    pub jobs_failed: usize,
    /// Jobs without a gang specification that got a status event instead.
    pub status_events: usize,
    /// Every warning recorded during the session, in order.
    pub warnings: Vec<SessionWarning>,
}

pub struct Session {
    uid: SessionId,
    cache: Arc<dyn Cache>,

    jobs: BTreeMap<JobId, JobInfo>,
    nodes: BTreeMap<String, NodeInfo>,
    queues: BTreeMap<QueueId, QueueInfo>,
    others: Vec<TaskInfo>,

    backlog: Vec<JobId>,
    backfill_ready: BTreeSet<JobId>,

    registry: PolicyRegistry,
    event_handlers: Vec<EventHandler>,
    warnings: Vec<SessionWarning>,
}

impl Session {
    /// Opens a session over a fresh snapshot.
    ///
    /// Jobs failing the registry's validity check are left out of the
    /// session. A gang job gets an `Unschedulable` condition tagged with this
    /// session and its status is persisted right away; a job without a gang
    /// gets a status event. Plugins see the session once it is indexed.
    pub fn open(cache: Arc<dyn Cache>, registry: PolicyRegistry) -> Self {
        let uid = SessionId::new();
        let snapshot = cache.snapshot();

        let mut ssn = Session {
            uid,
            cache,
            jobs: BTreeMap::new(),
            nodes: snapshot
                .nodes
                .into_iter()
                .map(|n| (n.name.clone(), n))
                .collect(),
            queues: snapshot.queues.into_iter().map(|q| (q.uid, q)).collect(),
            others: snapshot.others,
            backlog: Vec::new(),
            backfill_ready: BTreeSet::new(),
            registry,
            event_handlers: Vec::new(),
            warnings: Vec::new(),
        };

        for job in snapshot.jobs {
            match ssn.registry.job_valid(&job) {
                Some(result) => ssn.reject(job, result),
                None => {
                    ssn.jobs.insert(job.uid, job);
                }
            }
        }

        for plugin in ssn.registry.plugins() {
            plugin.on_session_open(&mut ssn);
        }

        info!(
            session_uid = %ssn.uid,
            jobs = ssn.jobs.len(),
            queues = ssn.queues.len(),
            nodes = ssn.nodes.len(),
            "Opened session"
        );
        ssn
    }

    fn reject(&mut self, mut job: JobInfo, result: ValidateResult) {
        info!(
            session_uid = %self.uid,
            job_id = %job.uid,
            reason = %result.reason,
            "Job failed validity check; excluding from session"
        );

        match job.gang.as_mut() {
            None => self.cache.record_job_status_event(&job),
            Some(gang) => {
                gang.status.set_condition(JobCondition::unschedulable(
                    self.uid,
                    result.reason,
                    result.message,
                ));
                if let Err(e) = self.cache.update_job_status(&job) {
                    self.record(SessionWarning::StatusNotPersisted {
                        job: job.uid,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        // Its tasks stay visible, but nothing can schedule them.
        self.others.extend(job.tasks().cloned());
    }

    /// Closes the session: plugins are notified, then every job's status is
    /// reconciled and persisted. One job failing to persist does not stop
    /// the others.
    pub fn close(mut self) -> CloseSummary {
        for plugin in self.registry.plugins() {
            plugin.on_session_close(&self);
        }

        let mut summary = CloseSummary {
            session_uid: self.uid,
            jobs_updated: 0,
            jobs_failed: 0,
            status_events: 0,
            warnings: Vec::new(),
        };

        let jobs = std::mem::take(&mut self.jobs);
        for mut job in jobs.into_values() {
            let Some(status) = job_status(&self.uid, &job) else {
                self.cache.record_job_status_event(&job);
                summary.status_events += 1;
                continue;
            };
            if let Some(gang) = job.gang.as_mut() {
                gang.status = status;
            }
            match self.cache.update_job_status(&job) {
                Ok(_) => summary.jobs_updated += 1,
                Err(e) => {
                    summary.jobs_failed += 1;
                    self.record(SessionWarning::StatusNotPersisted {
                        job: job.uid,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        summary.warnings = std::mem::take(&mut self.warnings);
        info!(
            session_uid = %self.uid,
            updated = summary.jobs_updated,
            failed = summary.jobs_failed,
            events = summary.status_events,
            warnings = summary.warnings.len(),
            "Closed session"
        );
        summary
    }

    /// Starts a statement: placements and evictions made through it can be
    /// discarded as a unit.
    pub fn statement(&mut self) -> Statement<'_> {
        Statement::new(self)
    }

    pub fn uid(&self) -> SessionId {
        self.uid
    }

    pub fn jobs(&self) -> &BTreeMap<JobId, JobInfo> {
        &self.jobs
    }

    pub fn job(&self, uid: &JobId) -> Option<&JobInfo> {
        self.jobs.get(uid)
    }

    /// The session's record of a task.
    pub fn task(&self, job: &JobId, task: &TaskId) -> Option<&TaskInfo> {
        self.jobs.get(job).and_then(|j| j.task(task))
    }

    pub fn nodes(&self) -> &BTreeMap<String, NodeInfo> {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    pub fn queues(&self) -> &BTreeMap<QueueId, QueueInfo> {
        &self.queues
    }

    pub fn queue(&self, uid: &QueueId) -> Option<&QueueInfo> {
        self.queues.get(uid)
    }

    /// Tasks whose job is not part of this session.
    pub fn others(&self) -> &[TaskInfo] {
        &self.others
    }

    /// Defers a job to a later backlog pass.
    pub fn add_to_backlog(&mut self, job: JobId) {
        if !self.backlog.contains(&job) {
            self.backlog.push(job);
        }
    }

    pub fn backlog(&self) -> &[JobId] {
        &self.backlog
    }

    /// Jobs that became ready while placed on backfill capacity. They are
    /// not dispatched in this session.
    pub fn backfill_ready_jobs(&self) -> &BTreeSet<JobId> {
        &self.backfill_ready
    }

    pub fn is_backfill_ready(&self, job: &JobId) -> bool {
        self.backfill_ready.contains(job)
    }

    pub fn clear_backfill_ready(&mut self, job: &JobId) -> bool {
        self.backfill_ready.remove(job)
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Secondary failures recorded so far.
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    pub fn add_event_handler(&mut self, handler: EventHandler) {
        self.event_handlers.push(handler);
    }

    pub fn job_order(&self, l: &JobInfo, r: &JobInfo) -> Ordering {
        self.registry.job_order(l, r)
    }

    pub fn queue_order(&self, l: &QueueInfo, r: &QueueInfo) -> Ordering {
        self.registry.queue_order(l, r)
    }

    pub fn task_order(&self, l: &TaskInfo, r: &TaskInfo) -> Ordering {
        self.registry.task_order(l, r)
    }

    pub fn predicate(&self, task: &TaskInfo, node: &NodeInfo) -> Result<(), PredicateError> {
        self.registry.predicate(task, node)
    }

    pub fn preemptable(&self, preemptor: &TaskInfo, preemptee: &TaskInfo) -> bool {
        self.registry.preemptable(preemptor, preemptee)
    }

    pub fn reclaimable(&self, reclaimer: &TaskInfo, reclaimee: &TaskInfo) -> bool {
        self.registry.reclaimable(reclaimer, reclaimee)
    }

    pub fn overused(&self, queue: &QueueInfo) -> bool {
        self.registry.overused(queue)
    }

    pub fn job_ready(&self, job: &JobInfo) -> bool {
        self.registry.job_ready(job)
    }

    pub fn job_valid(&self, job: &JobInfo) -> Option<ValidateResult> {
        self.registry.job_valid(job)
    }

    /// Tentatively places `task` on `hostname` as `Pipelined`. Nothing is
    /// sent to the cache and gang readiness is not checked.
    pub fn pipeline(&mut self, task: &TaskInfo, hostname: &str) {
        self.pipeline_task(task, hostname);
    }

    pub(crate) fn pipeline_task(&mut self, task: &TaskInfo, hostname: &str) -> Option<TaskInfo> {
        let placed = self.relocate_or_record(
            task.job,
            task.uid,
            TaskStatus::Pipelined,
            hostname,
            "pipeline",
        )?;
        self.fire_allocate(&placed);
        Some(placed)
    }

    /// Places `task` on `hostname` for good.
    ///
    /// Volumes are reserved first; if that fails nothing changes. Once the
    /// placement leaves the job ready, its `Allocated` tasks are dispatched,
    /// unless this placement used backfill capacity: then the job is marked
    /// backfill-ready and nothing is bound in this session.
    pub fn allocate(
        &mut self,
        task: &TaskInfo,
        hostname: &str,
        using_backfill: bool,
    ) -> SessionResult<()> {
        self.allocate_task(task, hostname, using_backfill)
            .map(|_| ())
    }

    pub(crate) fn allocate_task(
        &mut self,
        task: &TaskInfo,
        hostname: &str,
        using_backfill: bool,
    ) -> SessionResult<Option<TaskInfo>> {
        let current = self.current(task);
        if let Err(e) = self.cache.allocate_volumes(&current, hostname) {
            error!(
                session_uid = %self.uid,
                task_id = %current.uid,
                node = %hostname,
                error = %e,
                "Failed to allocate volumes"
            );
            return Err(SessionError::VolumeAllocation {
                task: current.uid,
                node: hostname.to_string(),
                reason: format!("{e:#}"),
            });
        }

        let status = if using_backfill {
            TaskStatus::AllocatedOverBackfill
        } else {
            TaskStatus::Allocated
        };
        let Some(placed) =
            self.relocate_or_record(current.job, current.uid, status, hostname, "allocate")
        else {
            // The placement was dropped; release the reservation made for it.
            if let Err(e) = self.cache.revert_volumes(&current) {
                self.record(SessionWarning::VolumeRevertFailed {
                    task: current.uid,
                    error: format!("{e:#}"),
                });
            }
            return Ok(None);
        };
        self.fire_allocate(&placed);

        let ready = self
            .jobs
            .get(&placed.job)
            .is_some_and(|job| self.registry.job_ready(job));
        if ready {
            if using_backfill {
                debug!(
                    session_uid = %self.uid,
                    job_id = %placed.job,
                    "Job ready on backfill capacity; deferring dispatch"
                );
                self.backfill_ready.insert(placed.job);
            } else {
                self.dispatch_allocated(placed.job);
            }
        }

        Ok(Some(placed))
    }

    fn dispatch_allocated(&mut self, job: JobId) {
        let ids: Vec<TaskId> = self
            .jobs
            .get(&job)
            .map(|j| j.tasks_with_status(TaskStatus::Allocated).map(|t| t.uid).collect())
            .unwrap_or_default();

        for task in ids {
            if let Err(error) = self.dispatch(job, task) {
                self.record(SessionWarning::DispatchFailed { job, task, error });
            }
        }
    }

    /// Binds one allocated task: volumes first, then the task itself.
    fn dispatch(&mut self, job: JobId, task: TaskId) -> SessionResult<()> {
        let Some(current) = self.task(&job, &task).cloned() else {
            return Err(SessionError::JobNotFound(job));
        };

        self.cache
            .bind_volumes(&current)
            .map_err(|e| SessionError::VolumeBind {
                task,
                reason: format!("{e:#}"),
            })?;
        self.cache
            .bind(&current, &current.node_name)
            .map_err(|e| SessionError::Bind {
                task,
                node: current.node_name.clone(),
                reason: format!("{e:#}"),
            })?;

        self.relocate_or_record(job, task, TaskStatus::Binding, &current.node_name, "dispatch");
        Ok(())
    }

    /// Asks the cache to evict `task`. On success the task becomes
    /// `Releasing` and its capacity moves from `used` to `releasing` on its
    /// node; it is not idle until a later snapshot confirms the release.
    pub fn evict(&mut self, task: &TaskInfo, reason: &str) -> SessionResult<()> {
        let current = self.current(task);
        if let Err(e) = self.cache.evict(&current, reason) {
            error!(
                session_uid = %self.uid,
                task_id = %current.uid,
                reason,
                error = %e,
                "Failed to evict task"
            );
            return Err(SessionError::Evict {
                task: current.uid,
                reason: format!("{e:#}"),
            });
        }

        if let Some(released) = self.relocate_or_record(
            current.job,
            current.uid,
            TaskStatus::Releasing,
            &current.node_name,
            "evict",
        ) {
            self.fire_deallocate(&released);
        }
        Ok(())
    }

    /// Stores `cond` on the job's gang status, replacing any condition of
    /// the same kind.
    pub fn update_job_condition(&mut self, job: &JobId, cond: JobCondition) -> SessionResult<()> {
        let info = self
            .jobs
            .get_mut(job)
            .ok_or(SessionError::JobNotFound(*job))?;
        let gang = info
            .gang
            .as_mut()
            .ok_or(SessionError::NoGangStatus(*job))?;
        gang.status.set_condition(cond);
        Ok(())
    }

    /// The session's own copy of `task`, or `task` itself when the session
    /// does not know it.
    fn current(&self, task: &TaskInfo) -> TaskInfo {
        self.task(&task.job, &task.uid)
            .cloned()
            .unwrap_or_else(|| task.clone())
    }

    pub(crate) fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub(crate) fn record(&mut self, warning: SessionWarning) {
        match &warning {
            SessionWarning::BindingNotReverted { .. }
            | SessionWarning::EvictionNotReverted { .. }
            | SessionWarning::VolumeRevertFailed { .. } => {
                warn!(session_uid = %self.uid, warning = %warning, "Compensation incomplete");
            }
            _ => {
                error!(session_uid = %self.uid, error = %warning, "Session update failed");
            }
        }
        self.warnings.push(warning);
    }

    pub(crate) fn fire_allocate(&mut self, task: &TaskInfo) {
        let event = Event { task };
        for handler in &mut self.event_handlers {
            if let Some(f) = handler.allocate_func.as_mut() {
                f(&event);
            }
        }
    }

    pub(crate) fn fire_deallocate(&mut self, task: &TaskInfo) {
        let event = Event { task };
        for handler in &mut self.event_handlers {
            if let Some(f) = handler.deallocate_func.as_mut() {
                f(&event);
            }
        }
    }

    pub(crate) fn relocate_or_record(
        &mut self,
        job: JobId,
        task: TaskId,
        status: TaskStatus,
        hostname: &str,
        operation: &'static str,
    ) -> Option<TaskInfo> {
        match self.relocate(job, task, status, hostname, operation) {
            Ok(t) => Some(t),
            Err(w) => {
                self.record(w);
                None
            }
        }
    }

    /// Moves a task to `status` on `hostname`, updating the job index and
    /// every node involved. Either all of it happens or none of it does.
    pub(crate) fn relocate(
        &mut self,
        job_id: JobId,
        task_id: TaskId,
        status: TaskStatus,
        hostname: &str,
        operation: &'static str,
    ) -> Result<TaskInfo, SessionWarning> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(SessionWarning::JobNotIndexed {
                job: job_id,
                task: task_id,
                operation,
            })?;
        let current = job.task(&task_id).cloned().ok_or(SessionWarning::TaskUpdate(
            JobError::TaskNotFound {
                job: job_id,
                task: task_id,
            },
        ))?;

        let mut updated = current.clone();
        updated.status = status;
        updated.node_name = hostname.to_string();

        let from = occupied_node(&current);
        let to = occupied_node(&updated);
        for name in [from, to].into_iter().flatten() {
            if !self.nodes.contains_key(name) {
                return Err(SessionWarning::NodeNotIndexed {
                    node: name.to_string(),
                    task: task_id,
                    operation,
                });
            }
        }

        let nodes = &mut self.nodes;
        match (from, to) {
            (Some(a), Some(b)) if a == b => {
                node_mut(nodes, a, task_id, operation)?
                    .update_task(&updated)
                    .map_err(SessionWarning::NodeUpdate)?;
            }
            (from, to) => {
                let removed = match from {
                    Some(a) => Some((
                        a,
                        node_mut(nodes, a, task_id, operation)?
                            .remove_task(&task_id)
                            .map_err(SessionWarning::NodeUpdate)?,
                    )),
                    None => None,
                };
                if let Some(b) = to {
                    let added = node_mut(nodes, b, task_id, operation)?.add_task(&updated);
                    if let Err(e) = added {
                        if let Some((a, old)) = removed {
                            if let Some(node) = nodes.get_mut(a) {
                                // Putting back what was just removed cannot run short.
                                let _ = node.add_task(&old);
                            }
                        }
                        return Err(SessionWarning::NodeUpdate(e));
                    }
                }
            }
        }

        job.update_task_status(&task_id, status)
            .map_err(SessionWarning::TaskUpdate)?;
        job.set_task_node(&task_id, hostname)
            .map_err(SessionWarning::TaskUpdate)?;

        if let Some(node) = to.and_then(|name| nodes.get(name)) {
            debug!(
                session_uid = %self.uid,
                task_id = %task_id,
                status = %status,
                node = %node.name,
                idle = %node.idle(),
                used = %node.used(),
                releasing = %node.releasing(),
                "Updated task placement"
            );
        }
        Ok(updated)
    }
}

fn occupied_node(task: &TaskInfo) -> Option<&str> {
    (task.status.occupies_node() && !task.node_name.is_empty()).then_some(task.node_name.as_str())
}

fn node_mut<'n>(
    nodes: &'n mut BTreeMap<String, NodeInfo>,
    name: &str,
    task: TaskId,
    operation: &'static str,
) -> Result<&'n mut NodeInfo, SessionWarning> {
    nodes
        .get_mut(name)
        .ok_or_else(|| SessionWarning::NodeNotIndexed {
            node: name.to_string(),
            task,
            operation,
        })
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}:", self.uid)?;
        for job in self.jobs.values() {
            writeln!(f, "{}", job)?;
        }
        for node in self.nodes.values() {
            writeln!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClusterSnapshot, GangGroup, Resource};
    use crate::cache::MockCache;

    fn cache_with(job: JobInfo) -> Arc<MockCache> {
        Arc::new(MockCache::new(
            ClusterSnapshot::new()
                .with_node(NodeInfo::new("node-a", Resource::new(4000, 8192)))
                .with_job(job),
        ))
    }

    fn one_task_job() -> (JobInfo, TaskInfo) {
        let mut job = JobInfo::new("solo", QueueId::new(), Some(GangGroup::new(0)));
        let task = TaskInfo::new(job.uid, "t0", Resource::new(1000, 1024));
        job.add_task(task.clone());
        let task = job.task(&task.uid).cloned().unwrap_or(task);
        (job, task)
    }

    #[test]
    fn test_pipeline_needs_releasing_capacity() {
        let (job, task) = one_task_job();
        let cache = cache_with(job);
        let mut ssn = Session::open(cache.clone(), PolicyRegistry::new());

        ssn.pipeline(&task, "node-a");

        // Pipelined draws on releasing capacity, which this node does not have.
        assert_eq!(ssn.task(&task.job, &task.uid).unwrap().status, TaskStatus::Pending);
        assert_eq!(ssn.warnings().len(), 1);
        assert!(cache.journal().binds.is_empty());
        assert!(cache.journal().allocated_volumes.is_empty());
    }

    #[test]
    fn test_relocate_unknown_node_changes_nothing() {
        let (job, task) = one_task_job();
        let mut ssn = Session::open(cache_with(job), PolicyRegistry::new());

        let err = ssn
            .relocate(task.job, task.uid, TaskStatus::Allocated, "missing", "allocate")
            .unwrap_err();

        assert!(matches!(err, SessionWarning::NodeNotIndexed { .. }));
        let stored = ssn.task(&task.job, &task.uid).unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert!(stored.node_name.is_empty());
    }

    #[test]
    fn test_relocate_moves_between_nodes() {
        let (job, task) = one_task_job();
        let cache = Arc::new(MockCache::new(
            ClusterSnapshot::new()
                .with_node(NodeInfo::new("node-a", Resource::new(4000, 8192)))
                .with_node(NodeInfo::new("node-b", Resource::new(4000, 8192)))
                .with_job(job),
        ));
        let mut ssn = Session::open(cache, PolicyRegistry::new());

        ssn.relocate(task.job, task.uid, TaskStatus::Allocated, "node-a", "allocate")
            .unwrap();
        ssn.relocate(task.job, task.uid, TaskStatus::Allocated, "node-b", "allocate")
            .unwrap();

        assert_eq!(ssn.node("node-a").unwrap().task_count(), 0);
        assert_eq!(ssn.node("node-a").unwrap().idle(), &Resource::new(4000, 8192));
        assert!(ssn.node("node-b").unwrap().task(&task.uid).is_some());
        assert_eq!(ssn.task(&task.job, &task.uid).unwrap().node_name, "node-b");
    }

    #[test]
    fn test_update_job_condition() {
        let (job, _) = one_task_job();
        let job_id = job.uid;
        let plain = JobInfo::new("plain", QueueId::new(), None);
        let plain_id = plain.uid;
        let cache = Arc::new(MockCache::new(
            ClusterSnapshot::new().with_job(job).with_job(plain),
        ));
        let mut ssn = Session::open(cache, PolicyRegistry::new());
        let cond = JobCondition::unschedulable(ssn.uid(), "r", "m");

        ssn.update_job_condition(&job_id, cond.clone()).unwrap();
        assert_eq!(
            ssn.job(&job_id).unwrap().gang.as_ref().unwrap().status.conditions,
            vec![cond.clone()]
        );
        assert_eq!(
            ssn.update_job_condition(&plain_id, cond.clone()),
            Err(SessionError::NoGangStatus(plain_id))
        );
        let unknown = JobId::new();
        assert_eq!(
            ssn.update_job_condition(&unknown, cond),
            Err(SessionError::JobNotFound(unknown))
        );
    }

    #[test]
    fn test_backlog_is_deduplicated() {
        let (job, _) = one_task_job();
        let job_id = job.uid;
        let mut ssn = Session::open(cache_with(job), PolicyRegistry::new());
        ssn.add_to_backlog(job_id);
        ssn.add_to_backlog(job_id);
        assert_eq!(ssn.backlog(), &[job_id]);
    }

    #[test]
    fn test_display_lists_jobs_and_nodes() {
        let (job, _) = one_task_job();
        let ssn = Session::open(cache_with(job), PolicyRegistry::new());
        let dump = ssn.to_string();
        assert!(dump.starts_with(&format!("Session {}:", ssn.uid())));
        assert!(dump.contains("name solo"));
        assert!(dump.contains("Node (node-a)"));
    }
}

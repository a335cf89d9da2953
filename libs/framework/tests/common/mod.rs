//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gangplank_framework::api::{
    GangGroup, JobInfo, NodeInfo, Resource, TaskInfo, TaskStatus, ValidateResult,
};
use gangplank_framework::{Event, EventHandler, Plugin, PolicyRegistry, Session};
use gangplank_id::{QueueId, TaskId};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gangplank_framework=debug")
        .with_test_writer()
        .try_init();
}

/// Gang readiness the way the job status reconciler counts it: a job is
/// ready once more than `min_member` of its tasks hold resources. A job with
/// fewer tasks than its gang minimum is invalid.
pub struct GangPlugin;

impl Plugin for GangPlugin {
    fn name(&self) -> &str {
        "gang"
    }

    fn job_ready(&self, job: &JobInfo) -> Option<bool> {
        Some(job.ready_task_num() > job.min_available() as usize)
    }

    fn job_valid(&self, job: &JobInfo) -> Option<ValidateResult> {
        let tasks = job.tasks().count();
        let min = job.min_available() as usize;
        if tasks < min {
            Some(ValidateResult::fail(
                "NotEnoughTasks",
                format!("{tasks} tasks, gang needs {min}"),
            ))
        } else {
            Some(ValidateResult::pass())
        }
    }
}

pub fn gang_registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    registry.register(Arc::new(GangPlugin));
    registry
}

pub fn node(name: &str, milli_cpu: u64, memory: u64) -> NodeInfo {
    NodeInfo::new(name, Resource::new(milli_cpu, memory))
}

/// A gang job with `n` pending tasks of 1 CPU / 1 GiB each.
pub fn gang_job(name: &str, min_member: u32, n: usize) -> (JobInfo, Vec<TaskInfo>) {
    let job = JobInfo::new(name, QueueId::new(), Some(GangGroup::new(min_member)));
    with_tasks(job, n)
}

pub fn with_tasks(mut job: JobInfo, n: usize) -> (JobInfo, Vec<TaskInfo>) {
    let ids: Vec<TaskId> = (0..n)
        .map(|i| {
            let name = format!("{}-{i}", job.name);
            let task = TaskInfo::new(job.uid, name, Resource::new(1000, 1024));
            let uid = task.uid;
            job.add_task(task);
            uid
        })
        .collect();
    let tasks = ids.iter().filter_map(|id| job.task(id).cloned()).collect();
    (job, tasks)
}

/// Places every task of `job` on `node` in `status`.
pub fn place_all(mut job: JobInfo, node: &str, status: TaskStatus) -> JobInfo {
    let tasks: Vec<TaskInfo> = job.tasks().cloned().collect();
    for task in tasks {
        job.add_task(task.placed(node, status));
    }
    job
}

/// Names of tasks seen by allocate and deallocate handlers, in order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn handler(&self) -> EventHandler {
        let on_alloc = self.0.clone();
        let on_dealloc = self.0.clone();
        EventHandler::new()
            .on_allocate(move |e: &Event<'_>| {
                if let Ok(mut log) = on_alloc.lock() {
                    log.push(format!("allocate {}", e.task.name));
                }
            })
            .on_deallocate(move |e: &Event<'_>| {
                if let Ok(mut log) = on_dealloc.lock() {
                    log.push(format!("deallocate {}", e.task.name));
                }
            })
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// Checks the capacity and membership invariants over the whole session.
pub fn assert_consistent(ssn: &Session) {
    for node in ssn.nodes().values() {
        assert_eq!(
            &node.accounted(),
            node.allocatable(),
            "capacity drift on {}",
            node
        );
        for task in node.tasks() {
            assert_eq!(task.node_name, node.name, "task {} listed on wrong node", task.uid);
        }
    }

    for job in ssn.jobs().values() {
        for task in job.tasks() {
            let holders: Vec<&NodeInfo> = ssn
                .nodes()
                .values()
                .filter(|n| n.task(&task.uid).is_some())
                .collect();
            if task.status.occupies_node() && !task.node_name.is_empty() {
                assert_eq!(holders.len(), 1, "task {} on {} nodes", task, holders.len());
                assert_eq!(holders[0].name, task.node_name);
                let stored = holders[0].task(&task.uid).map(|t| t.status);
                assert_eq!(stored, Some(task.status), "node disagrees on {}", task);
            } else {
                assert!(holders.is_empty(), "unplaced task {} still on a node", task);
            }
        }
    }
}

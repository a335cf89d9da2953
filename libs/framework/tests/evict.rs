mod common;

use std::sync::Arc;

use common::{assert_consistent, gang_job, node, place_all, EventLog};
use gangplank_framework::api::{ClusterSnapshot, Resource, TaskStatus};
use gangplank_framework::{MockCache, PolicyRegistry, Session, SessionError};

fn running_cluster() -> (Arc<MockCache>, Vec<gangplank_framework::api::TaskInfo>) {
    let (job, _) = gang_job("victim", 1, 2);
    let job = place_all(job, "node-a", TaskStatus::Running);
    let tasks = job.tasks().cloned().collect();
    let cache = Arc::new(MockCache::new(
        ClusterSnapshot::new()
            .with_node(node("node-a", 4000, 8192))
            .with_job(job),
    ));
    (cache, tasks)
}

#[test]
fn test_evict_moves_used_to_releasing() {
    let (cache, tasks) = running_cluster();
    let mut ssn = Session::open(cache.clone(), PolicyRegistry::new());
    let events = EventLog::default();
    ssn.add_event_handler(events.handler());
    let idle_before = ssn.node("node-a").unwrap().idle().clone();

    ssn.evict(&tasks[0], "preempted").unwrap();

    let stored = ssn.task(&tasks[0].job, &tasks[0].uid).unwrap();
    assert_eq!(stored.status, TaskStatus::Releasing);
    assert_eq!(stored.node_name, "node-a");

    let node_a = ssn.node("node-a").unwrap();
    assert_eq!(node_a.idle(), &idle_before);
    assert_eq!(node_a.used(), &Resource::new(1000, 1024));
    assert_eq!(node_a.releasing(), &Resource::new(1000, 1024));
    assert_eq!(node_a.future_idle(), Resource::new(3000, 7168));

    assert_eq!(
        cache.journal().evictions,
        vec![(tasks[0].uid, "preempted".to_string())]
    );
    assert_eq!(events.entries(), vec![format!("deallocate {}", tasks[0].name)]);
    assert_consistent(&ssn);
}

#[test]
fn test_evict_failure_changes_nothing() {
    let (cache, tasks) = running_cluster();
    cache.fail_evict(tasks[0].uid);
    let mut ssn = Session::open(cache.clone(), PolicyRegistry::new());
    let events = EventLog::default();
    ssn.add_event_handler(events.handler());

    let err = ssn.evict(&tasks[0], "reclaimed").unwrap_err();

    assert!(matches!(err, SessionError::Evict { task, .. } if task == tasks[0].uid));
    assert_eq!(
        ssn.task(&tasks[0].job, &tasks[0].uid).unwrap().status,
        TaskStatus::Running
    );
    assert_eq!(ssn.node("node-a").unwrap().releasing(), &Resource::default());
    assert!(events.entries().is_empty());
}

#[test]
fn test_pipeline_onto_releasing_capacity() {
    let (victim, _) = gang_job("victim", 1, 1);
    let victim = place_all(victim, "node-a", TaskStatus::Running);
    let running = victim.tasks().cloned().collect::<Vec<_>>();
    let (waiting, pending) = gang_job("waiting", 1, 1);
    let cache = Arc::new(MockCache::new(
        ClusterSnapshot::new()
            .with_node(node("node-a", 1000, 1024))
            .with_job(victim)
            .with_job(waiting),
    ));
    let mut ssn = Session::open(cache.clone(), PolicyRegistry::new());
    let events = EventLog::default();
    ssn.add_event_handler(events.handler());

    ssn.evict(&running[0], "preempted").unwrap();
    ssn.pipeline(&pending[0], "node-a");

    let stored = ssn.task(&pending[0].job, &pending[0].uid).unwrap();
    assert_eq!(stored.status, TaskStatus::Pipelined);
    assert_eq!(stored.node_name, "node-a");

    let node_a = ssn.node("node-a").unwrap();
    assert_eq!(node_a.task_count(), 2);
    assert_eq!(node_a.idle(), &Resource::default());
    assert_eq!(node_a.releasing(), &Resource::default());
    assert_eq!(node_a.used(), &Resource::new(1000, 1024));

    // Pipelining never reaches the cache.
    let journal = cache.journal();
    assert!(journal.allocated_volumes.is_empty());
    assert!(journal.binds.is_empty());
    assert_eq!(
        events.entries(),
        vec![
            format!("deallocate {}", running[0].name),
            format!("allocate {}", pending[0].name),
        ]
    );
    assert_consistent(&ssn);
}

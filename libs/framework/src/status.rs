//! Job status reconciliation run at session close.

use gangplank_id::SessionId;

use crate::api::{ConditionKind, ConditionStatus, GangStatus, JobInfo, JobPhase, TaskStatus};

/// Recomputes a gang job's externally visible status from its task index.
///
/// Returns `None` for jobs without a gang specification. The result depends
/// only on the task-status index and the conditions already on the job, so
/// calling it twice on an unchanged job yields the same status.
pub fn job_status(session: &SessionId, job: &JobInfo) -> Option<GangStatus> {
    let gang = job.gang.as_ref()?;
    let mut status = gang.status.clone();

    let unschedulable = status.conditions.iter().any(|c| {
        c.kind == ConditionKind::Unschedulable
            && c.status == ConditionStatus::True
            && c.transition_id.as_ref() == Some(session)
    });

    let running = job.count_with_status(TaskStatus::Running);
    status.phase = if running != 0 && unschedulable {
        JobPhase::Unknown
    } else if job.ready_task_num() > gang.min_member as usize {
        JobPhase::Running
    } else {
        JobPhase::Pending
    };

    status.running = count(running);
    status.failed = count(job.count_with_status(TaskStatus::Failed));
    status.succeeded = count(job.count_with_status(TaskStatus::Succeeded));

    Some(status)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

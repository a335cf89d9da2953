//! Speculative placement: apply now, keep or undo as a unit.

use gangplank_id::{JobId, TaskId};
use tracing::{debug, warn};

use crate::api::{TaskInfo, TaskStatus};
use crate::error::{SessionResult, SessionWarning};
use crate::session::Session;

#[derive(Debug)]
enum Operation {
    Pipeline {
        job: JobId,
        task: TaskId,
        prior_status: TaskStatus,
        prior_node: String,
    },
    Allocate {
        job: JobId,
        task: TaskId,
        prior_status: TaskStatus,
        prior_node: String,
        was_backfill_ready: bool,
    },
    Evict {
        task: TaskId,
    },
}

/// A log of primitives applied to a session.
///
/// Operations take effect immediately. [`Statement::commit`] keeps them;
/// [`Statement::discard`] undoes them in reverse order as far as the
/// platform allows. A task already sent to bind stays bound, and an eviction
/// that was requested stays requested; both are recorded as session warnings.
pub struct Statement<'a> {
    ssn: &'a mut Session,
    operations: Vec<Operation>,
}

impl<'a> Statement<'a> {
    pub(crate) fn new(ssn: &'a mut Session) -> Self {
        Self {
            ssn,
            operations: Vec::new(),
        }
    }

    /// Read access to the session while the statement is open.
    pub fn session(&self) -> &Session {
        self.ssn
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn pipeline(&mut self, task: &TaskInfo, hostname: &str) {
        let (prior_status, prior_node) = self.prior(task);
        if self.ssn.pipeline_task(task, hostname).is_some() {
            self.operations.push(Operation::Pipeline {
                job: task.job,
                task: task.uid,
                prior_status,
                prior_node,
            });
        }
    }

    pub fn allocate(
        &mut self,
        task: &TaskInfo,
        hostname: &str,
        using_backfill: bool,
    ) -> SessionResult<()> {
        let (prior_status, prior_node) = self.prior(task);
        let was_backfill_ready = self.ssn.is_backfill_ready(&task.job);
        if self
            .ssn
            .allocate_task(task, hostname, using_backfill)?
            .is_some()
        {
            self.operations.push(Operation::Allocate {
                job: task.job,
                task: task.uid,
                prior_status,
                prior_node,
                was_backfill_ready,
            });
        }
        Ok(())
    }

    pub fn evict(&mut self, task: &TaskInfo, reason: &str) -> SessionResult<()> {
        self.ssn.evict(task, reason)?;
        self.operations.push(Operation::Evict { task: task.uid });
        Ok(())
    }

    /// Keeps every operation. They are already applied.
    pub fn commit(self) {
        debug!(
            session_uid = %self.ssn.uid(),
            operations = self.operations.len(),
            "Committed statement"
        );
    }

    /// Undoes the operations, newest first.
    pub fn discard(self) {
        let Statement { ssn, operations } = self;
        debug!(
            session_uid = %ssn.uid(),
            operations = operations.len(),
            "Discarding statement"
        );

        for op in operations.into_iter().rev() {
            match op {
                Operation::Pipeline {
                    job,
                    task,
                    prior_status,
                    prior_node,
                } => {
                    if let Some(reverted) =
                        ssn.relocate_or_record(job, task, prior_status, &prior_node, "discard")
                    {
                        ssn.fire_deallocate(&reverted);
                    }
                }
                Operation::Allocate {
                    job,
                    task,
                    prior_status,
                    prior_node,
                    was_backfill_ready,
                } => unallocate(
                    ssn,
                    job,
                    task,
                    (prior_status, &prior_node),
                    was_backfill_ready,
                ),
                Operation::Evict { task } => {
                    warn!(
                        session_uid = %ssn.uid(),
                        task_id = %task,
                        "Eviction cannot be revoked; leaving task releasing"
                    );
                    ssn.record(SessionWarning::EvictionNotReverted { task });
                }
            }
        }
    }

    fn prior(&self, task: &TaskInfo) -> (TaskStatus, String) {
        self.ssn
            .task(&task.job, &task.uid)
            .map(|t| (t.status, t.node_name.clone()))
            .unwrap_or((task.status, task.node_name.clone()))
    }
}

fn unallocate(
    ssn: &mut Session,
    job: JobId,
    task: TaskId,
    (prior_status, prior_node): (TaskStatus, &str),
    was_backfill_ready: bool,
) {
    let Some(current) = ssn.task(&job, &task).cloned() else {
        ssn.record(SessionWarning::JobNotIndexed {
            job,
            task,
            operation: "discard",
        });
        return;
    };
    if current.status == TaskStatus::Binding {
        ssn.record(SessionWarning::BindingNotReverted { task });
        return;
    }

    if let Err(e) = ssn.cache().revert_volumes(&current) {
        ssn.record(SessionWarning::VolumeRevertFailed {
            task,
            error: format!("{e:#}"),
        });
    }
    if let Some(reverted) = ssn.relocate_or_record(job, task, prior_status, prior_node, "discard") {
        // A mark set before this allocation survives while the job stays ready.
        let still_ready = ssn.job(&job).is_some_and(|j| ssn.job_ready(j));
        if !was_backfill_ready || !still_ready {
            ssn.clear_backfill_ready(&job);
        }
        ssn.fire_deallocate(&reverted);
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("session", &self.ssn.uid())
            .field("operations", &self.operations)
            .finish()
    }
}

//! Error and warning types.

use std::path::PathBuf;

use gangplank_id::{JobId, TaskId};
use thiserror::Error;

use crate::api::{JobError, NodeError};

/// Result type for session primitives.
pub type SessionResult<T> = Result<T, SessionError>;

/// A session primitive failed because a cache call it depends on failed.
/// Nothing in the session was changed by the failing call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to allocate volumes for task {task} on node {node}: {reason}")]
    VolumeAllocation {
        task: TaskId,
        node: String,
        reason: String,
    },

    #[error("failed to bind volumes for task {task}: {reason}")]
    VolumeBind { task: TaskId, reason: String },

    #[error("failed to bind task {task} to node {node}: {reason}")]
    Bind {
        task: TaskId,
        node: String,
        reason: String,
    },

    #[error("failed to evict task {task}: {reason}")]
    Evict { task: TaskId, reason: String },

    #[error("job {0} not found in session")]
    JobNotFound(JobId),

    #[error("job {0} has no gang status to hold conditions")]
    NoGangStatus(JobId),
}

/// A secondary failure the session logged and stepped over.
///
/// These never abort a primitive. They are kept on the session so the
/// driver can inspect what went wrong during a cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionWarning {
    #[error("job {job} of task {task} not indexed during {operation}")]
    JobNotIndexed {
        job: JobId,
        task: TaskId,
        operation: &'static str,
    },

    #[error("node '{node}' of task {task} not indexed during {operation}")]
    NodeNotIndexed {
        node: String,
        task: TaskId,
        operation: &'static str,
    },

    #[error("task status update failed: {0}")]
    TaskUpdate(JobError),

    #[error("node update failed: {0}")]
    NodeUpdate(NodeError),

    #[error("dispatch of task {task} in job {job} failed: {error}")]
    DispatchFailed {
        job: JobId,
        task: TaskId,
        error: SessionError,
    },

    #[error("status of job {job} not persisted: {error}")]
    StatusNotPersisted { job: JobId, error: String },

    #[error("task {task} already dispatched; binding cannot be reverted")]
    BindingNotReverted { task: TaskId },

    #[error("eviction of task {task} already requested; it cannot be reverted")]
    EvictionNotReverted { task: TaskId },

    #[error("volume reservation of task {task} not released: {error}")]
    VolumeRevertFailed { task: TaskId, error: String },
}

/// Scheduler configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scheduler configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scheduler configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("scheduler configuration names no actions")]
    EmptyActions,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

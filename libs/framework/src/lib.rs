//! # gangplank-framework
//!
//! The decision core of a gang-aware batch scheduler.
//!
//! Each scheduling cycle opens a [`Session`] over a point-in-time snapshot
//! taken from a [`Cache`]. Configured [`Action`]s walk the session's jobs and
//! nodes, consult the [`PolicyRegistry`] that [`Plugin`]s populate, and call
//! the session's primitives:
//!
//! - [`Session::pipeline`] places a task tentatively on releasing capacity;
//! - [`Session::allocate`] places it for good and, once the job's gang is
//!   ready, binds the job's allocated tasks through the cache;
//! - [`Session::evict`] asks the cache to release a running task.
//!
//! A [`Statement`] applies the same primitives but can discard them as a
//! unit. Closing the session reconciles every job's gang status and persists
//! it through the cache.
//!
//! [`Scheduler`] wires one cycle together from a [`SchedulerConfiguration`];
//! [`SchedulerWorker`] runs cycles on an interval until shutdown.

pub mod action;
pub mod api;
pub mod cache;
pub mod conf;
pub mod error;
pub mod event;
pub mod plugin;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod statement;
pub mod status;
pub mod worker;

pub use action::{Action, ActionRegistry};
pub use cache::{Cache, Journal, MockCache};
pub use conf::{PluginOption, PolicyKind, SchedulerConfiguration, Tier, WorkerConfig};
pub use error::{ConfigError, SessionError, SessionResult, SessionWarning};
pub use event::{Event, EventHandler};
pub use plugin::{Plugin, PluginArguments, PluginBuilders};
pub use registry::PolicyRegistry;
pub use scheduler::{CycleStats, Scheduler};
pub use session::{CloseSummary, Session};
pub use statement::Statement;
pub use status::job_status;
pub use worker::SchedulerWorker;

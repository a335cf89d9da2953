//! # gangplank-id
//!
//! Typed identifiers for the entities a scheduling cycle works with.
//!
//! Every identifier is a ULID wrapped in a newtype and rendered with a short
//! prefix naming the entity kind:
//!
//! - `job_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `task_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `queue_01HV4Z4NYPLTRS0JTUA8XDME5F`
//! - `ssn_01HV4Z5PZQMVST1KVWB9YENF6G`
//!
//! The prefix keeps a task id from being handed to an API expecting a job id
//! once it has been turned into a string, and ULIDs sort by creation time,
//! which keeps map iteration over ids stable across runs of the same snapshot.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

pub use ulid::Ulid;

//! Identifier types.

use crate::{uid, IdError, Ulid};

uid!(
    /// Identifies a job (a gang of tasks scheduled together).
    JobId,
    "job"
);
uid!(
    /// Identifies one task of a job.
    TaskId,
    "task"
);
uid!(
    /// Identifies a queue.
    QueueId,
    "queue"
);
uid!(
    /// Identifies one scheduling session. Minted at session open and written
    /// into every condition the session records, so the next cycle can tell
    /// its own markings from stale ones.
    SessionId,
    "ssn"
);

/// Splits `{prefix}_{ulid}` and parses the ULID half.
#[doc(hidden)]
pub fn parse_prefixed(s: &str, expected: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    let Some((prefix, rest)) = s.split_once('_') else {
        return Err(IdError::MissingSeparator);
    };

    if prefix != expected {
        return Err(IdError::WrongPrefix {
            expected,
            actual: prefix.to_string(),
        });
    }

    rest.parse::<Ulid>().map_err(|e| IdError::InvalidUlid {
        value: rest.to_string(),
        reason: e.to_string(),
    })
}

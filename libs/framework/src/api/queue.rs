//! Queues.

use std::fmt;

use gangplank_id::QueueId;
use serde::{Deserialize, Serialize};

/// A queue. The session never mutates queues; ordering and overuse plugins
/// read `weight` and whatever they derive from the jobs submitted to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub uid: QueueId,
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl QueueInfo {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            uid: QueueId::new(),
            name: name.into(),
            weight,
        }
    }
}

impl fmt::Display for QueueInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue ({}): name {}, weight {}", self.uid, self.name, self.weight)
    }
}

//! Allocation event notification.
//!
//! Handlers run synchronously, in registration order, on the caller's
//! thread, right after the primitive that triggered them succeeded. They
//! return nothing: a handler deals with its own failures.

use std::fmt;

use crate::api::TaskInfo;

/// The task affected by an allocation or deallocation, as the session now
/// records it.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub task: &'a TaskInfo,
}

pub type EventFn = Box<dyn FnMut(&Event<'_>) + Send>;

/// A pair of optional callbacks.
#[derive(Default)]
pub struct EventHandler {
    /// Called after a successful allocate or pipeline.
    pub allocate_func: Option<EventFn>,
    /// Called after a successful evict, and when a statement undoes a placement.
    pub deallocate_func: Option<EventFn>,
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_allocate(mut self, f: impl FnMut(&Event<'_>) + Send + 'static) -> Self {
        self.allocate_func = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_deallocate(mut self, f: impl FnMut(&Event<'_>) + Send + 'static) -> Self {
        self.deallocate_func = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("allocate_func", &self.allocate_func.is_some())
            .field("deallocate_func", &self.deallocate_func.is_some())
            .finish()
    }
}

//! Observer hooks.
//!
//! All hooks are optional and fixed at build time. They are called outside
//! the scheduler's lock, one at a time, in the order the transitions
//! happened, so a hook may call back into the scheduler (push more work,
//! start, cancel).

use std::fmt;
use std::sync::Arc;

use crate::domain::{StatusSnapshot, Task};
use crate::scheduler::Scheduler;

pub type CompletedHook = Box<dyn Fn(&StatusSnapshot) + Send + Sync>;
pub type TaskHook<P> = Box<dyn Fn(&StatusSnapshot, &Arc<Task<P>>) + Send + Sync>;
/// `(start_count, scheduler, was_resumed)`.
pub type StartHook<P> = Box<dyn Fn(usize, &Scheduler<P>, bool) + Send + Sync>;

pub struct Hooks<P> {
    pub on_completed: Option<CompletedHook>,
    pub on_progress: Option<TaskHook<P>>,
    pub on_start: Option<StartHook<P>>,
    pub on_error: Option<TaskHook<P>>,
}

impl<P> Default for Hooks<P> {
    fn default() -> Self {
        Self {
            on_completed: None,
            on_progress: None,
            on_start: None,
            on_error: None,
        }
    }
}

impl<P> fmt::Debug for Hooks<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_completed", &self.on_completed.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_start", &self.on_start.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

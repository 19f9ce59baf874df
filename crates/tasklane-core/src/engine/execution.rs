//! Execution Wrapper & Resolution Protocol.
//!
//! An admitted task is spawned on the runtime (the non-blocking boundary),
//! its body is called with a `TaskContext`, and its outcome is decided:
//!
//! - body returns `Ok(v)` without requesting deferred completion: SUCCESS(v)
//! - body returns `Err(e)` or panics: ERROR, even if it requested deferred
//!   completion
//! - body requested deferred completion and returned `Ok`: the task stays in
//!   flight until its `Resolver` is called
//!
//! A resolver only works for the admission it was created for and only while
//! that admission is still in flight; every other call returns `false`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};

use serde_json::Value;
use tracing::warn;

use crate::domain::{AdmissionMode, Outcome, SequenceId, StatusNotification, Task};
use crate::queue::TaskRecord;
use crate::scheduler::Scheduler;

/// One admission, as handed from the admission engine to the runtime.
pub(crate) struct Dispatch<P> {
    pub task: Arc<Task<P>>,
    pub sequence_id: SequenceId,
    pub mode: AdmissionMode,
    pub attempt: u32,
}

impl<P> Dispatch<P> {
    pub fn for_record(record: &TaskRecord<P>) -> Self {
        Self {
            task: Arc::clone(&record.task),
            sequence_id: record.sequence_id,
            mode: record.mode,
            attempt: record.attempts,
        }
    }
}

/// What a task body receives.
pub struct TaskContext<P> {
    scheduler: Scheduler<P>,
    task: Arc<Task<P>>,
    sequence_id: SequenceId,
    mode: AdmissionMode,
    attempt: u32,
    deferred: AtomicBool,
}

impl<P: Send + 'static> TaskContext<P> {
    /// Keep the task in flight after the body returns and hand out the
    /// resolver that settles it later.
    pub fn request_async_completion(&self) -> Resolver<P> {
        self.deferred.store(true, Ordering::SeqCst);
        self.scheduler.mark_awaiting(self.sequence_id, self.attempt);
        Resolver {
            scheduler: self.scheduler.clone(),
            sequence_id: self.sequence_id,
            attempt: self.attempt,
        }
    }
}

impl<P> TaskContext<P> {
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    /// 1 for the first admission, incremented by every restart that re-runs it.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    pub fn task(&self) -> &Arc<Task<P>> {
        &self.task
    }

    /// Shortcut for `self.task().state()`.
    pub fn state(&self) -> MutexGuard<'_, P> {
        self.task.state()
    }

    fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

impl<P> fmt::Debug for TaskContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("sequence_id", &self.sequence_id)
            .field("mode", &self.mode)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Settles one admission of a task. Cheap to clone; every clone settles the
/// same admission, and only the first call takes effect.
pub struct Resolver<P> {
    scheduler: Scheduler<P>,
    sequence_id: SequenceId,
    attempt: u32,
}

impl<P: Send + 'static> Resolver<P> {
    /// Returns `false` if the task already left `inFlight` (resolved or
    /// canceled) or was re-admitted by a restart.
    pub fn resolve(&self, outcome: Outcome, result: impl Into<Value>) -> bool {
        self.resolve_with(StatusNotification::new(outcome, result))
    }

    pub fn resolve_with(&self, notification: StatusNotification) -> bool {
        self.scheduler
            .settle(self.sequence_id, self.attempt, notification)
    }

    pub fn succeed(&self, result: impl Into<Value>) -> bool {
        self.resolve(Outcome::Success, result)
    }

    pub fn fail(&self, result: impl Into<Value>) -> bool {
        self.resolve(Outcome::Error, result)
    }
}

impl<P> Resolver<P> {
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }
}

impl<P> Clone for Resolver<P> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            sequence_id: self.sequence_id,
            attempt: self.attempt,
        }
    }
}

impl<P> fmt::Debug for Resolver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("sequence_id", &self.sequence_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Run one admission. Spawned by the scheduler; never called inline.
pub(crate) async fn execute<P: Send + 'static>(scheduler: Scheduler<P>, dispatch: Dispatch<P>) {
    let Dispatch {
        task,
        sequence_id,
        mode,
        attempt,
    } = dispatch;
    let body = task.body();
    let ctx = TaskContext {
        scheduler,
        task,
        sequence_id,
        mode,
        attempt,
        deferred: AtomicBool::new(false),
    };

    let notification = match panic::catch_unwind(AssertUnwindSafe(|| body(&ctx))) {
        Ok(Ok(_)) if ctx.is_deferred() => None,
        Ok(Ok(value)) => Some(StatusNotification::success(value)),
        Ok(Err(err)) => Some(StatusNotification::error(err.into_result())),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(task = %sequence_id, %message, "task panicked");
            Some(StatusNotification::error(message))
        }
    };

    if let Some(notification) = notification {
        ctx.scheduler.settle(sequence_id, attempt, notification);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

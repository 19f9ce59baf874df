//! Engine - admission, execution and completion tracking.
//!
//! The engine functions are plain functions over `EngineState`. They never
//! call user code: anything that must reach the outside world (observer
//! calls, task dispatches, completion waiters) is queued as an `Effect` in
//! the state's outbox and delivered by the scheduler after the lock is
//! released, in the order it was queued.

pub mod admission;
pub mod completion;
pub mod execution;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::domain::{AdmissionMode, SchedulerError, StatusNotification, StatusSnapshot, Task};
use crate::queue::QueueStore;

pub use self::execution::{Resolver, TaskContext};

pub(crate) type Waiter = oneshot::Sender<Result<StatusSnapshot, SchedulerError>>;

/// Work for the scheduler to do once the state lock is released.
pub(crate) enum Effect<P> {
    Started { start_count: usize, resumed: bool },
    Progress { snapshot: StatusSnapshot, task: Arc<Task<P>> },
    Failed { snapshot: StatusSnapshot, task: Arc<Task<P>> },
    Completed(StatusSnapshot),
    Dispatch(execution::Dispatch<P>),
    /// Consume (unless manual) and check for completion. Queued behind the
    /// observer call of a settle or start, so that observer can add work
    /// that this check then sees.
    Recheck,
    Aborted(SchedulerError),
}

/// Everything the scheduler mutates, guarded by one mutex.
pub(crate) struct EngineState<P> {
    pub store: QueueStore<P>,
    pub paused: bool,

    /// The completion observer already fired for the current run.
    pub completion_signaled: bool,

    /// Set by an internal-consistency failure; cleared by clear/restart.
    pub aborted: Option<SchedulerError>,

    /// Last terminal transition, reused by the completion snapshot.
    pub last_notification: Option<(StatusNotification, AdmissionMode)>,

    pub outbox: VecDeque<Effect<P>>,

    /// Someone is delivering the outbox right now.
    pub draining: bool,

    pub waiters: Vec<Waiter>,
}

impl<P> EngineState<P> {
    pub fn new() -> Self {
        Self {
            store: QueueStore::new(),
            paused: false,
            completion_signaled: false,
            aborted: None,
            last_notification: None,
            outbox: VecDeque::new(),
            draining: false,
            waiters: Vec::new(),
        }
    }

    pub fn emit(&mut self, effect: Effect<P>) {
        self.outbox.push_back(effect);
    }

    /// Abort the run. Only the first failure is kept and reported.
    pub fn abort(&mut self, err: SchedulerError) -> SchedulerError {
        if let Some(existing) = &self.aborted {
            return existing.clone();
        }
        self.paused = true;
        self.aborted = Some(err.clone());
        self.emit(Effect::Aborted(err.clone()));
        err
    }

    /// Back to a fresh run over the current store contents.
    pub fn reset_run(&mut self) {
        self.paused = false;
        self.completion_signaled = false;
        self.aborted = None;
        self.last_notification = None;
    }
}

impl<P> Default for EngineState<P> {
    fn default() -> Self {
        Self::new()
    }
}

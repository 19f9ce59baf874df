//! Task - the unit of work registered with a scheduler.
//!
//! A task is a callable plus an optional name and a per-task payload `P`.
//! The payload replaces ad hoc fields on the callable: the body can write to
//! it through its context, and observers read it back from the task handed to
//! them.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::mode::Placement;
use super::outcome::{Outcome, TaskError};
use crate::engine::TaskContext;

/// Body of a task. Runs once per admission.
pub type TaskFn<P> = Arc<dyn Fn(&TaskContext<P>) -> Result<Value, TaskError> + Send + Sync>;

pub struct Task<P = ()> {
    name: Option<String>,
    body: TaskFn<P>,
    state: Mutex<P>,
}

impl<P: Default> Task<P> {
    /// A task whose outcome is decided by the body's return value, unless the
    /// body calls `TaskContext::request_async_completion`.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&TaskContext<P>) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            body: Arc::new(body),
            state: Mutex::new(P::default()),
        }
    }

    pub fn named<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TaskContext<P>) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Self::new(body).with_name(name)
    }
}

impl<P: Default + Send + 'static> Task<P> {
    /// A task backed by a future.
    ///
    /// The body requests async completion, spawns the future on the current
    /// tokio runtime and resolves with its output: `Ok(v)` as SUCCESS with `v`,
    /// `Err(e)` as ERROR with `e.into_result()`.
    pub fn from_future<F, Fut>(make: F) -> Self
    where
        F: Fn(&TaskContext<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::new(move |ctx| {
            let resolver = ctx.request_async_completion();
            let fut = make(ctx);
            tokio::spawn(async move {
                match fut.await {
                    Ok(value) => resolver.resolve(Outcome::Success, value),
                    Err(err) => resolver.resolve(Outcome::Error, err.into_result()),
                };
            });
            Ok(Value::Null)
        })
    }
}

impl<P> Task<P> {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_state(mut self, state: P) -> Self {
        self.state = Mutex::new(state);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Per-task payload. Never held by the scheduler while user code runs.
    pub fn state(&self) -> MutexGuard<'_, P> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn body(&self) -> TaskFn<P> {
        Arc::clone(&self.body)
    }
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One or many tasks for a single `add` call.
///
/// Entries without an explicit placement use the configured default.
pub struct Batch<P> {
    entries: Vec<(Option<Placement>, Arc<Task<P>>)>,
}

impl<P> Batch<P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, task: impl Into<Arc<Task<P>>>) -> Self {
        self.entries.push((None, task.into()));
        self
    }

    pub fn with_placed(mut self, placement: Placement, task: impl Into<Arc<Task<P>>>) -> Self {
        self.entries.push((Some(placement), task.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(Option<Placement>, Arc<Task<P>>)> {
        self.entries
    }
}

impl<P> Default for Batch<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> From<Task<P>> for Batch<P> {
    fn from(task: Task<P>) -> Self {
        Batch::new().with(task)
    }
}

impl<P> From<Arc<Task<P>>> for Batch<P> {
    fn from(task: Arc<Task<P>>) -> Self {
        Batch::new().with(task)
    }
}

impl<P> From<Vec<Task<P>>> for Batch<P> {
    fn from(tasks: Vec<Task<P>>) -> Self {
        tasks.into_iter().fold(Batch::new(), |batch, task| batch.with(task))
    }
}

impl<P> From<Vec<Arc<Task<P>>>> for Batch<P> {
    fn from(tasks: Vec<Arc<Task<P>>>) -> Self {
        tasks.into_iter().fold(Batch::new(), |batch, task| batch.with(task))
    }
}

impl<P> From<Vec<(Placement, Task<P>)>> for Batch<P> {
    fn from(tasks: Vec<(Placement, Task<P>)>) -> Self {
        tasks
            .into_iter()
            .fold(Batch::new(), |batch, (placement, task)| {
                batch.with_placed(placement, task)
            })
    }
}

//! SchedulerBuilder - configuration, hooks and initial tasks in one place.
//!
//! `build()` captures the current tokio runtime handle; tasks are spawned on
//! it for the scheduler's whole lifetime. Building outside a runtime fails
//! early with `SchedulerError::NoRuntime` rather than on the first `start()`.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::SchedulerConfig;
use crate::domain::{AdmissionMode, Batch, Placement, SchedulerError, StatusSnapshot, Task};
use crate::hooks::Hooks;
use crate::scheduler::Scheduler;

/// Builds a `Scheduler`.
///
/// ```ignore
/// let scheduler = Scheduler::<()>::builder()
///     .default_mode(AdmissionMode::Barrier)
///     .on_completed(|s| println!("done: {:?}", s.counts))
///     .tasks(vec![Task::new(|_| Ok(Value::Null))])
///     .build()?;
/// ```
pub struct SchedulerBuilder<P> {
    config: SchedulerConfig,
    hooks: Hooks<P>,
    initial: Vec<(Batch<P>, Option<AdmissionMode>)>,
}

impl<P: Send + 'static> SchedulerBuilder<P> {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            hooks: Hooks::default(),
            initial: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_mode(mut self, mode: AdmissionMode) -> Self {
        self.config.default_mode = mode;
        self
    }

    pub fn enforce_default_mode(mut self, enforce: bool) -> Self {
        self.config.enforce_default_mode = enforce;
        self
    }

    pub fn manual_consume(mut self, manual: bool) -> Self {
        self.config.manual_consume = manual;
        self
    }

    pub fn default_placement(mut self, placement: Placement) -> Self {
        self.config.default_placement = placement;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Called once per run, when the last task settles.
    pub fn on_completed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.hooks.on_completed = Some(Box::new(hook));
        self
    }

    /// Called for every task that ends SUCCESS.
    pub fn on_progress<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StatusSnapshot, &Arc<Task<P>>) + Send + Sync + 'static,
    {
        self.hooks.on_progress = Some(Box::new(hook));
        self
    }

    /// Called on every `start()` with `(start_count, scheduler, was_resumed)`.
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &Scheduler<P>, bool) + Send + Sync + 'static,
    {
        self.hooks.on_start = Some(Box::new(hook));
        self
    }

    /// Called for every task that ends ERROR or CANCELED.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StatusSnapshot, &Arc<Task<P>>) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Box::new(hook));
        self
    }

    /// Tasks registered right after construction, as if passed to `add`.
    pub fn tasks(mut self, tasks: impl Into<Batch<P>>) -> Self {
        self.initial.push((tasks.into(), None));
        self
    }

    pub fn tasks_with_mode(mut self, tasks: impl Into<Batch<P>>, mode: AdmissionMode) -> Self {
        self.initial.push((tasks.into(), Some(mode)));
        self
    }

    pub fn build(self) -> Result<Scheduler<P>, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let scheduler = Scheduler::from_parts(self.config, self.hooks, runtime);
        for (batch, mode) in self.initial {
            scheduler.add(batch, mode);
        }
        Ok(scheduler)
    }
}

impl<P: Send + 'static> Default for SchedulerBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

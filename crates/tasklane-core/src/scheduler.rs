//! Scheduler - the public surface over the engine.
//!
//! # Locking
//! One `std::sync::Mutex` guards the whole `EngineState`. It is held only
//! for bookkeeping and never while user code runs: observer calls and task
//! dispatches are queued as effects and delivered by `flush` after the lock
//! is released. Exactly one caller delivers at a time, so observers see
//! transitions in the order they happened even on a multi-thread runtime.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::builder::SchedulerBuilder;
use crate::config::SchedulerConfig;
use crate::domain::{
    AdmissionMode, Batch, Counts, SchedulerError, SequenceId, StatusNotification, StatusSnapshot,
    Task,
};
use crate::engine::{EngineState, Effect, admission, completion, execution};
use crate::hooks::Hooks;
use crate::queue::{Collection, CollectionsView, TaskDescriptor, TaskKey};

/// Result of `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// The task was moved to `failed` as CANCELED.
    Canceled,
    /// The validation callback said no. Nothing changed.
    Refused,
    /// The task is unknown or not in flight. Nothing changed.
    NotInFlight,
}

struct Inner<P> {
    config: SchedulerConfig,
    hooks: Hooks<P>,
    runtime: Handle,
    state: Mutex<EngineState<P>>,
}

pub struct Scheduler<P = ()> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("counts", &state.store.counts())
            .field("paused", &state.paused)
            .finish_non_exhaustive()
    }
}

impl<P: Send + 'static> Scheduler<P> {
    pub fn builder() -> SchedulerBuilder<P> {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(config: SchedulerConfig, hooks: Hooks<P>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                hooks,
                runtime,
                state: Mutex::new(EngineState::new()),
            }),
        }
    }

    // ----------------------------------------------------------------------
    // Store operations
    // ----------------------------------------------------------------------

    /// Register one or many tasks. `mode` applies to the whole batch; `None`
    /// (or `enforce_default_mode`) uses the configured default.
    pub fn add(
        &self,
        tasks: impl Into<Batch<P>>,
        mode: impl Into<Option<AdmissionMode>>,
    ) -> &Self {
        self.add_batch(tasks.into(), mode.into());
        self
    }

    /// Register exactly one task and return its id.
    pub fn push(
        &self,
        task: impl Into<Arc<Task<P>>>,
        mode: impl Into<Option<AdmissionMode>>,
    ) -> SequenceId {
        let ids = self.add_batch(Batch::new().with(task), mode.into());
        ids[0]
    }

    fn add_batch(&self, batch: Batch<P>, mode: Option<AdmissionMode>) -> Vec<SequenceId> {
        let config = &self.inner.config;
        let mode = config.mode_for(mode);
        let ids = {
            let mut state = self.lock();
            let ids: Vec<SequenceId> = batch
                .into_entries()
                .into_iter()
                .map(|(placement, task)| {
                    state
                        .store
                        .insert(task, mode, config.placement_for(placement))
                })
                .collect();
            if !ids.is_empty() {
                state.completion_signaled = false;
            }
            ids
        };
        if config.debug {
            debug!(count = ids.len(), %mode, "tasks added");
        }
        ids
    }

    /// Number of tasks registered since construction or the last `clear`.
    pub fn length(&self) -> usize {
        self.lock().store.total()
    }

    /// Find a task by id, name or identity. Scan order: pending, in flight,
    /// succeeded, failed.
    pub fn get(&self, key: impl Into<TaskKey<P>>) -> Option<TaskDescriptor<P>> {
        self.lock().store.find(&key.into())
    }

    /// Drop every task and reset counters. Hooks are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.store.reset();
        state.reset_run();
    }

    // ----------------------------------------------------------------------
    // Admission
    // ----------------------------------------------------------------------

    pub fn can_admit_next(&self) -> bool {
        admission::can_admit_next(&self.lock().store)
    }

    /// Admit whatever the admission rule allows now. Returns how many tasks
    /// were admitted. Needed explicitly under `manual_consume`.
    pub fn consume(&self) -> Result<usize, SchedulerError> {
        let result = {
            let mut state = self.lock();
            admission::consume(&mut state, &self.inner.config).map_err(|e| state.abort(e))
        };
        self.flush();
        result
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Start or resume processing.
    ///
    /// Records `start_count` on the first call of a run, clears the pause
    /// flag, calls the start hook, then consumes (unless manual) and checks
    /// for completion, so an empty run completes immediately. Work the start
    /// hook adds is admitted by that same consume.
    pub fn start(&self) -> Result<&Self, SchedulerError> {
        {
            let mut state = self.lock();
            if let Some(err) = &state.aborted {
                return Err(err.clone());
            }
            let start_count = state.store.mark_started();
            let resumed = start_count != state.store.pending_len();
            state.paused = false;
            state.completion_signaled = false;
            state.emit(Effect::Started {
                start_count,
                resumed,
            });
            state.emit(Effect::Recheck);
        }
        self.flush();
        match self.aborted() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Pause admission. In-flight tasks keep running and can still settle.
    pub fn stop(&self) {
        self.lock().paused = true;
        if self.inner.config.debug {
            debug!("paused");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().paused
    }

    /// Cancel an in-flight task. See `cancel_if`.
    pub fn cancel(&self, key: impl Into<TaskKey<P>>) -> Result<Cancellation, SchedulerError> {
        self.cancel_if(key, |_| true)
    }

    /// Cancel an in-flight task if `validate` agrees.
    ///
    /// The task is settled as CANCELED and the error hook fires, but nothing
    /// new is admitted: call `start()` (or `consume()`) to continue the
    /// pipeline. A body that is already running is not interrupted; its
    /// resolver just stops having any effect.
    pub fn cancel_if<F>(
        &self,
        key: impl Into<TaskKey<P>>,
        validate: F,
    ) -> Result<Cancellation, SchedulerError>
    where
        F: FnOnce(&TaskDescriptor<P>) -> bool,
    {
        let key = key.into();
        let Some(descriptor) = self.get_in_flight(&key) else {
            if self.inner.config.debug {
                debug!(?key, "cancel ignored: task not in flight");
            }
            return Ok(Cancellation::NotInFlight);
        };
        if !validate(&descriptor) {
            if self.inner.config.debug {
                debug!(task = %descriptor.sequence_id, "cancel refused by validation");
            }
            return Ok(Cancellation::Refused);
        }

        let result = {
            let mut state = self.lock();
            let still_live = state
                .store
                .in_flight()
                .iter()
                .any(|r| r.is_attempt(descriptor.sequence_id, descriptor.attempts));
            if still_live {
                completion::on_task_terminal(
                    &mut state,
                    &self.inner.config,
                    StatusNotification::canceled(),
                    descriptor.sequence_id,
                    Some(Collection::InFlight),
                )
                .map(|()| Cancellation::Canceled)
                .map_err(|e| state.abort(e))
            } else {
                Ok(Cancellation::NotInFlight)
            }
        };
        self.flush();
        result
    }

    fn get_in_flight(&self, key: &TaskKey<P>) -> Option<TaskDescriptor<P>> {
        self.lock()
            .store
            .find(key)
            .filter(|d| d.collection == Collection::InFlight)
    }

    /// Re-enqueue processed tasks in insertion order and start again.
    ///
    /// With `exclude_errors`, failed tasks stay in the failed log instead of
    /// running again.
    pub fn restart(&self, exclude_errors: bool) -> Result<&Self, SchedulerError> {
        {
            let mut state = self.lock();
            state.store.requeue_all(exclude_errors);
            state.reset_run();
            if self.inner.config.debug {
                debug!(
                    restarts = state.store.restarts(),
                    pending = state.store.pending_len(),
                    exclude_errors,
                    "restart"
                );
            }
        }
        self.start()
    }

    /// Start the run and wait for it to complete.
    ///
    /// Resolves with the completion snapshot, or with the error that aborted
    /// the run.
    pub async fn run(&self) -> Result<StatusSnapshot, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.lock().waiters.push(tx);
        if let Err(err) = self.start() {
            drop(rx);
            self.lock().waiters.retain(|w| !w.is_closed());
            return Err(err);
        }
        rx.await.map_err(|_| SchedulerError::Dropped)?
    }

    // ----------------------------------------------------------------------
    // Read-only views
    // ----------------------------------------------------------------------

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn restarts(&self) -> u32 {
        self.lock().store.restarts()
    }

    pub fn counts(&self) -> Counts {
        self.lock().store.counts()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        StatusSnapshot::idle(state.store.counts(), state.store.restarts())
    }

    pub fn collections(&self) -> CollectionsView {
        self.lock().store.collections()
    }

    /// The error that aborted the current run, if any.
    pub fn aborted(&self) -> Option<SchedulerError> {
        self.lock().aborted.clone()
    }

    // ----------------------------------------------------------------------
    // Resolution protocol (called by execution)
    // ----------------------------------------------------------------------

    pub(crate) fn mark_awaiting(&self, id: SequenceId, attempt: u32) {
        let mut state = self.lock();
        if let Some(record) = state.store.in_flight_mut(id)
            && record.attempts == attempt
        {
            record.await_resolution();
        }
    }

    /// Settle admission `attempt` of task `id`. `false` if it is no longer
    /// in flight.
    pub(crate) fn settle(
        &self,
        id: SequenceId,
        attempt: u32,
        notification: StatusNotification,
    ) -> bool {
        let settled = {
            let mut state = self.lock();
            let live = state
                .store
                .in_flight()
                .iter()
                .any(|r| r.is_attempt(id, attempt));
            if live {
                if let Err(e) = completion::on_task_terminal(
                    &mut state,
                    &self.inner.config,
                    notification,
                    id,
                    None,
                ) {
                    state.abort(e);
                }
            } else if self.inner.config.debug {
                debug!(task = %id, attempt, "resolution ignored: task no longer in flight");
            }
            live
        };
        self.flush();
        settled
    }

    // ----------------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, EngineState<P>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver queued effects, unless another caller is already doing it.
    fn flush(&self) {
        {
            let mut state = self.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _guard = DrainGuard(self);
        loop {
            let effect = {
                let mut state = self.lock();
                match state.outbox.pop_front() {
                    Some(effect) => effect,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            self.apply(effect);
        }
    }

    fn apply(&self, effect: Effect<P>) {
        let hooks = &self.inner.hooks;
        match effect {
            Effect::Started {
                start_count,
                resumed,
            } => {
                if let Some(hook) = &hooks.on_start {
                    hook(start_count, self, resumed);
                }
            }
            Effect::Progress { snapshot, task } => {
                if let Some(hook) = &hooks.on_progress {
                    hook(&snapshot, &task);
                }
            }
            Effect::Failed { snapshot, task } => {
                if let Some(hook) = &hooks.on_error {
                    hook(&snapshot, &task);
                }
            }
            Effect::Completed(snapshot) => {
                if let Some(hook) = &hooks.on_completed {
                    hook(&snapshot);
                }
                let waiters = std::mem::take(&mut self.lock().waiters);
                for waiter in waiters {
                    let _ = waiter.send(Ok(snapshot.clone()));
                }
            }
            Effect::Recheck => {
                let mut state = self.lock();
                if let Err(e) = completion::recheck(&mut state, &self.inner.config) {
                    state.abort(e);
                }
            }
            Effect::Dispatch(dispatch) => {
                self.inner
                    .runtime
                    .spawn(execution::execute(self.clone(), dispatch));
            }
            Effect::Aborted(err) => {
                error!(%err, "run aborted");
                let waiters = std::mem::take(&mut self.lock().waiters);
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }
}

/// Releases the drain flag if a hook panics mid-delivery.
struct DrainGuard<'a, P>(&'a Scheduler<P>);

impl<P> Drop for DrainGuard<'_, P> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self
                .0
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Outcome, Placement, TaskError};
    use crate::engine::{Resolver, TaskContext};
    use crate::queue::TaskState;
    use serde_json::{Value, json};
    use std::time::Duration;

    /// Records observer calls as `(kind, task name, outcome)`.
    #[derive(Clone, Default)]
    struct Journal(Arc<std::sync::Mutex<Vec<(String, String, Option<Outcome>)>>>);

    impl Journal {
        fn push(&self, kind: &str, name: &str, outcome: Option<Outcome>) {
            self.0
                .lock()
                .unwrap()
                .push((kind.to_string(), name.to_string(), outcome));
        }

        fn entries(&self) -> Vec<(String, String, Option<Outcome>)> {
            self.0.lock().unwrap().clone()
        }

        fn names(&self, kind: &str) -> Vec<String> {
            self.entries()
                .into_iter()
                .filter(|(k, _, _)| k == kind)
                .map(|(_, n, _)| n)
                .collect()
        }

        fn count(&self, kind: &str) -> usize {
            self.names(kind).len()
        }
    }

    fn observed<P: Send + 'static>(journal: &Journal) -> SchedulerBuilder<P> {
        let (progress, errors, done, started) = (
            journal.clone(),
            journal.clone(),
            journal.clone(),
            journal.clone(),
        );
        SchedulerBuilder::new()
            .on_progress(move |s, t| progress.push("progress", t.name().unwrap_or("?"), s.outcome))
            .on_error(move |s, t| errors.push("error", t.name().unwrap_or("?"), s.outcome))
            .on_completed(move |s| done.push("completed", "", s.outcome))
            .on_start(move |_, _, resumed| {
                started.push("start", if resumed { "resumed" } else { "fresh" }, None)
            })
    }

    /// A concurrent task that resolves after `delay` on the runtime clock.
    fn delayed(name: &str, delay: u64) -> Task {
        Task::named(name, move |ctx| {
            let done = ctx.request_async_completion();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.succeed(json!(delay));
            });
            Ok(Value::Null)
        })
    }

    /// A task that stays in flight until the test resolves it.
    fn parked(name: &str, slot: &Arc<std::sync::Mutex<Option<Resolver<()>>>>) -> Task {
        let slot = Arc::clone(slot);
        Task::named(name, move |ctx| {
            *slot.lock().unwrap() = Some(ctx.request_async_completion());
            Ok(Value::Null)
        })
    }

    fn take(slot: &Arc<std::sync::Mutex<Option<Resolver<()>>>>) -> Resolver<()> {
        slot.lock().unwrap().take().expect("task has not run yet")
    }

    /// Let spawned tasks run.
    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn assert_size_invariant<P: Send + 'static>(s: &Scheduler<P>) {
        let c = s.counts();
        assert_eq!(c.pending + c.in_flight + c.finished, c.total);
        assert_eq!(c.total, s.length());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_tasks_report_in_resolution_order() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.add(
            vec![delayed("task1", 300), delayed("task2", 200), delayed("task3", 100)],
            None,
        );

        let snapshot = scheduler.run().await.unwrap();

        assert_eq!(journal.names("progress"), vec!["task3", "task2", "task1"]);
        assert_eq!(journal.count("completed"), 1);
        assert_eq!(snapshot.counts.finished, 3);
        assert_eq!(snapshot.counts.remaining, 0);
        assert_eq!(snapshot.counts.start, Some(3));
        assert_size_invariant(&scheduler);
    }

    #[tokio::test(start_paused = true)]
    async fn barrier_waits_for_predecessors_and_blocks_successors() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        let (a, b) = (
            Arc::new(std::sync::Mutex::new(None)),
            Arc::new(std::sync::Mutex::new(None)),
        );
        scheduler.push(parked("A", &a), None);
        scheduler.push(parked("B", &b), AdmissionMode::Barrier);
        scheduler.push(Task::named("C", |_| Ok(json!("c"))), None);

        scheduler.start().unwrap();
        settle_tasks().await;

        assert_eq!(scheduler.collections().in_flight, vec![SequenceId::new(0)]);
        assert_eq!(scheduler.get("B").unwrap().collection, Collection::Pending);
        assert!(!scheduler.can_admit_next());

        take(&a).succeed(Value::Null);
        settle_tasks().await;
        assert_eq!(scheduler.collections().in_flight, vec![SequenceId::new(1)]);
        assert_eq!(scheduler.get("C").unwrap().collection, Collection::Pending);

        take(&b).succeed(Value::Null);
        settle_tasks().await;

        assert_eq!(journal.names("progress"), vec!["A", "B", "C"]);
        assert_eq!(journal.count("completed"), 1);
        assert_size_invariant(&scheduler);
    }

    #[tokio::test]
    async fn synchronous_failure_lands_in_failed() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.add(
            Task::named("thrower", |_| {
                Err(TaskError::new("boom").with_payload(json!({"msg": "this is an error"})))
            }),
            None,
        );

        let snapshot = scheduler.run().await.unwrap();

        assert_eq!(
            journal.entries().iter().filter(|(k, _, _)| k == "error").count(),
            1
        );
        assert_eq!(snapshot.outcome, Some(Outcome::Error));
        assert_eq!(snapshot.result, json!({"msg": "this is an error"}));
        assert_eq!(scheduler.collections().failed, vec![SequenceId::new(0)]);
    }

    #[tokio::test]
    async fn panic_is_captured_as_error() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.push(Task::named("panics", |_| panic!("kaboom")), None);

        let snapshot = scheduler.run().await.unwrap();

        assert_eq!(journal.names("error"), vec!["panics"]);
        assert_eq!(snapshot.result, json!("kaboom"));
    }

    #[tokio::test]
    async fn synchronous_failure_wins_over_deferred_request() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.push(
            Task::named("both", |ctx| {
                let _resolver = ctx.request_async_completion();
                Err(TaskError::new("failed anyway"))
            }),
            None,
        );

        let snapshot = scheduler.run().await.unwrap();
        assert_eq!(snapshot.outcome, Some(Outcome::Error));
        assert_eq!(journal.names("error"), vec!["both"]);
    }

    #[tokio::test]
    async fn resolver_is_idempotent() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        let slot = Arc::new(std::sync::Mutex::new(None));
        scheduler.push(parked("once", &slot), None);
        scheduler.start().unwrap();
        settle_tasks().await;

        assert_eq!(
            scheduler.get("once").unwrap().state,
            TaskState::AwaitingResolution
        );
        let resolver = take(&slot);
        assert!(resolver.succeed(json!(1)));
        assert!(!resolver.succeed(json!(2)));
        assert!(!resolver.clone().fail(json!(3)));

        assert_eq!(journal.names("progress"), vec!["once"]);
        assert_eq!(journal.count("completed"), 1);
        assert_eq!(scheduler.collections().succeeded, vec![SequenceId::new(0)]);
    }

    #[tokio::test]
    async fn resolver_may_settle_inside_the_body() {
        let scheduler: Scheduler = Scheduler::builder().build().unwrap();
        scheduler.push(
            Task::named("inline", |ctx| {
                let done = ctx.request_async_completion();
                done.resolve(Outcome::Success, json!("early"));
                Ok(json!("ignored"))
            }),
            None,
        );

        let snapshot = scheduler.run().await.unwrap();
        assert_eq!(snapshot.result, json!("early"));
        assert_eq!(snapshot.counts.finished, 1);
    }

    #[tokio::test]
    async fn cancel_of_task_not_in_flight_changes_nothing() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        let id = scheduler.push(Task::named("waiting", |_| Ok(Value::Null)), None);
        let before = scheduler.collections();

        assert_eq!(scheduler.cancel(id).unwrap(), Cancellation::NotInFlight);
        assert_eq!(scheduler.cancel("unknown").unwrap(), Cancellation::NotInFlight);
        assert_eq!(scheduler.collections(), before);
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn cancel_settles_without_resuming_consumption() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        let slot = Arc::new(std::sync::Mutex::new(None));
        scheduler.push(parked("long", &slot), AdmissionMode::Barrier);
        scheduler.push(Task::named("next", |_| Ok(Value::Null)), None);
        scheduler.start().unwrap();
        settle_tasks().await;

        let refused = scheduler.cancel_if("long", |d| d.mode == AdmissionMode::Concurrent);
        assert_eq!(refused.unwrap(), Cancellation::Refused);
        assert_eq!(scheduler.get("long").unwrap().collection, Collection::InFlight);

        assert_eq!(scheduler.cancel("long").unwrap(), Cancellation::Canceled);
        settle_tasks().await;

        let canceled = scheduler.get("long").unwrap();
        assert_eq!(canceled.collection, Collection::Failed);
        assert_eq!(canceled.state, TaskState::Canceled);
        assert_eq!(journal.entries().last().unwrap().2, Some(Outcome::Canceled));
        assert_eq!(scheduler.get("next").unwrap().collection, Collection::Pending);
        assert_eq!(journal.count("completed"), 0);

        assert!(!take(&slot).succeed(Value::Null));

        scheduler.start().unwrap();
        settle_tasks().await;
        assert_eq!(journal.names("progress"), vec!["next"]);
        assert_eq!(journal.count("completed"), 1);
    }

    #[tokio::test]
    async fn restart_excluding_errors_requeues_successes_in_order() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.add(
            vec![
                Task::named("ok1", |_| Ok(json!(1))),
                Task::named("bad", |_| Err(TaskError::new("nope"))),
                Task::named("ok2", |_| Ok(json!(2))),
            ],
            AdmissionMode::Barrier,
        );
        scheduler.run().await.unwrap();
        assert_eq!(journal.names("progress"), vec!["ok1", "ok2"]);

        scheduler.stop();
        scheduler.restart(true).unwrap();
        assert_eq!(scheduler.restarts(), 1);
        assert_eq!(scheduler.counts().start, Some(2));
        assert_eq!(scheduler.collections().failed, vec![SequenceId::new(1)]);
        while scheduler.counts().remaining > 0 {
            settle_tasks().await;
        }

        assert_eq!(
            journal.names("progress"),
            vec!["ok1", "ok2", "ok1", "ok2"]
        );
        assert_eq!(journal.names("error"), vec!["bad"]);
        assert_eq!(journal.count("completed"), 2);
        assert_size_invariant(&scheduler);
    }

    #[tokio::test]
    async fn restart_invalidates_resolvers_of_previous_admission() {
        let scheduler: Scheduler = Scheduler::builder().build().unwrap();
        let slot = Arc::new(std::sync::Mutex::new(None));
        scheduler.push(parked("again", &slot), None);
        scheduler.start().unwrap();
        settle_tasks().await;
        let stale = take(&slot);

        scheduler.restart(false).unwrap();
        settle_tasks().await;
        let fresh = take(&slot);

        assert!(!stale.succeed(Value::Null));
        assert_eq!(scheduler.get("again").unwrap().attempts, 2);
        assert!(fresh.succeed(Value::Null));
    }

    #[tokio::test]
    async fn empty_run_completes_on_start() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();

        let snapshot = scheduler.run().await.unwrap();

        assert_eq!(snapshot.outcome, None);
        assert_eq!(snapshot.counts.total, 0);
        assert_eq!(journal.count("completed"), 1);
        assert_eq!(journal.names("start"), vec!["fresh"]);
    }

    #[tokio::test]
    async fn stop_pauses_admission_until_start() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal)
            .default_mode(AdmissionMode::Barrier)
            .build()
            .unwrap();
        let slot = Arc::new(std::sync::Mutex::new(None));
        scheduler.push(parked("first", &slot), None);
        scheduler.push(Task::named("second", |_| Ok(Value::Null)), None);
        scheduler.start().unwrap();
        settle_tasks().await;

        scheduler.stop();
        assert!(scheduler.is_stopped());
        assert!(take(&slot).succeed(Value::Null));
        settle_tasks().await;
        assert_eq!(scheduler.get("second").unwrap().collection, Collection::Pending);
        assert_eq!(scheduler.consume().unwrap(), 0);

        scheduler.start().unwrap();
        settle_tasks().await;
        assert!(!scheduler.is_stopped());
        assert_eq!(journal.names("start"), vec!["fresh", "resumed"]);
        assert_eq!(journal.names("progress"), vec!["first", "second"]);
        assert_eq!(journal.count("completed"), 1);
    }

    #[tokio::test]
    async fn manual_consume_is_driven_by_caller() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal)
            .manual_consume(true)
            .default_mode(AdmissionMode::Barrier)
            .build()
            .unwrap();
        scheduler.add(
            vec![
                Task::named("one", |_| Ok(Value::Null)),
                Task::named("two", |_| Ok(Value::Null)),
            ],
            None,
        );

        scheduler.start().unwrap();
        settle_tasks().await;
        assert_eq!(scheduler.counts().pending, 2);

        assert_eq!(scheduler.consume().unwrap(), 1);
        settle_tasks().await;
        assert_eq!(journal.names("progress"), vec!["one"]);
        assert_eq!(journal.count("completed"), 0);

        assert_eq!(scheduler.consume().unwrap(), 1);
        settle_tasks().await;
        assert_eq!(journal.names("progress"), vec!["one", "two"]);
        assert_eq!(journal.count("completed"), 1);
    }

    #[tokio::test]
    async fn enforced_default_mode_ignores_requests() {
        let scheduler: Scheduler = Scheduler::builder()
            .enforce_default_mode(true)
            .build()
            .unwrap();
        let id = scheduler.push(Task::new(|_| Ok(Value::Null)), AdmissionMode::Barrier);
        assert_eq!(scheduler.get(id).unwrap().mode, AdmissionMode::Concurrent);
    }

    #[tokio::test]
    async fn head_placement_runs_latest_first() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal)
            .default_placement(Placement::Head)
            .default_mode(AdmissionMode::Barrier)
            .build()
            .unwrap();
        scheduler.add(
            vec![
                Task::named("a", |_| Ok(Value::Null)),
                Task::named("b", |_| Ok(Value::Null)),
            ],
            None,
        );
        scheduler.add(
            vec![(Placement::Tail, Task::named("z", |_| Ok(Value::Null)))],
            None,
        );

        scheduler.run().await.unwrap();
        assert_eq!(journal.names("progress"), vec!["b", "a", "z"]);
    }

    #[tokio::test]
    async fn clear_resets_counters_but_not_ids() {
        let scheduler: Scheduler = Scheduler::builder().build().unwrap();
        scheduler.add(vec![Task::new(|_| Ok(Value::Null)), Task::new(|_| Ok(Value::Null))], None);
        assert_eq!(scheduler.length(), 2);

        scheduler.clear();
        assert_eq!(scheduler.length(), 0);
        assert_eq!(scheduler.counts(), Counts::default());

        let id = scheduler.push(Task::new(|_| Ok(Value::Null)), None);
        assert_eq!(id, SequenceId::new(2));
    }

    #[tokio::test]
    async fn tasks_can_push_follow_up_work() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.push(
            Task::named("parent", |ctx| {
                ctx.scheduler()
                    .push(Task::named("child", |_| Ok(json!("from child"))), None);
                Ok(Value::Null)
            }),
            None,
        );

        let snapshot = scheduler.run().await.unwrap();
        assert_eq!(journal.names("progress"), vec!["parent", "child"]);
        assert_eq!(snapshot.counts.total, 2);
        assert_eq!(journal.count("completed"), 1);
    }

    #[tokio::test]
    async fn error_observer_can_queue_a_retry_before_completion() {
        let journal = Journal::default();
        let handle: Arc<std::sync::Mutex<Option<Scheduler>>> = Arc::default();
        let completions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (slot, progress, done) = (
            Arc::clone(&handle),
            journal.clone(),
            Arc::clone(&completions),
        );
        let scheduler = Scheduler::<()>::builder()
            .on_error(move |_, task| {
                if task.name() == Some("flaky")
                    && let Some(scheduler) = slot.lock().unwrap().as_ref()
                {
                    scheduler.push(Task::named("retry", |_| Ok(json!("second try"))), None);
                }
            })
            .on_progress(move |_, task| progress.push("progress", task.name().unwrap_or("?"), None))
            .on_completed(move |s| done.lock().unwrap().push(s.clone()))
            .build()
            .unwrap();
        *handle.lock().unwrap() = Some(scheduler.clone());
        scheduler.push(Task::named("flaky", |_| Err(TaskError::new("first try"))), None);

        let snapshot = scheduler.run().await.unwrap();
        handle.lock().unwrap().take();

        assert_eq!(journal.names("progress"), vec!["retry"]);
        assert_eq!(completions.lock().unwrap().len(), 1);
        assert_eq!(snapshot.counts.total, 2);
        assert_eq!(snapshot.counts.remaining, 0);
        assert_eq!(snapshot.result, json!("second try"));
        assert_eq!(scheduler.counts(), snapshot.counts);
        assert_eq!(scheduler.collections().succeeded, vec![SequenceId::new(1)]);
        assert_eq!(scheduler.collections().failed, vec![SequenceId::new(0)]);
    }

    #[tokio::test]
    async fn start_hook_can_add_work_to_the_run() {
        let scheduler = Scheduler::<()>::builder()
            .on_start(|_, scheduler, resumed| {
                if !resumed {
                    scheduler.push(Task::named("seeded", |_| Ok(Value::Null)), None);
                }
            })
            .build()
            .unwrap();

        let snapshot = scheduler.run().await.unwrap();
        assert_eq!(snapshot.counts.total, 1);
        assert_eq!(snapshot.counts.finished, 1);
    }

    #[tokio::test]
    async fn debug_output_shows_config_and_counts() {
        let scheduler: Scheduler = Scheduler::builder().debug(true).build().unwrap();
        scheduler.push(Task::new(|_| Ok(Value::Null)), None);

        let rendered = format!("{scheduler:?}");
        assert!(rendered.starts_with("Scheduler {"));
        assert!(rendered.contains("debug: true"));
        assert!(rendered.contains("pending: 1"));
    }

    #[tokio::test]
    async fn per_task_state_is_visible_to_observers() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let scheduler = Scheduler::<u32>::builder()
            .on_progress(move |_, task| sink.lock().unwrap().push(*task.state()))
            .build()
            .unwrap();
        scheduler.push(
            Task::new(|ctx: &TaskContext<u32>| {
                *ctx.state() += 41;
                Ok(Value::Null)
            })
            .with_state(1),
            None,
        );

        scheduler.run().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[tokio::test(start_paused = true)]
    async fn future_tasks_resolve_with_their_output() {
        let journal = Journal::default();
        let scheduler = observed::<()>(&journal).build().unwrap();
        scheduler.add(
            vec![
                Task::from_future(|_| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!("slow"))
                })
                .with_name("slow"),
                Task::from_future(|_| async { Err(TaskError::new("fast failure")) })
                    .with_name("fast"),
            ],
            None,
        );

        scheduler.run().await.unwrap();
        assert_eq!(journal.names("error"), vec!["fast"]);
        assert_eq!(journal.names("progress"), vec!["slow"]);
    }

    #[tokio::test]
    async fn lookup_by_identity() {
        let scheduler: Scheduler = Scheduler::builder().build().unwrap();
        let task = Arc::new(Task::new(|_| Ok(Value::Null)));
        scheduler.push(Task::new(|_| Ok(Value::Null)), None);
        let id = scheduler.push(Arc::clone(&task), None);

        let found = scheduler.get(&task).unwrap();
        assert_eq!(found.sequence_id, id);
        assert_eq!(found.position, 1);
    }

    #[tokio::test]
    async fn run_reports_aborted_runs() {
        let scheduler: Scheduler = Scheduler::builder().build().unwrap();
        scheduler.push(Task::new(|_| Ok(Value::Null)), None);
        {
            let mut state = scheduler.lock();
            state.abort(SchedulerError::Inconsistent("forced".into()));
        }

        let err = scheduler.run().await.unwrap_err();
        assert_eq!(err, SchedulerError::Inconsistent("forced".into()));
        assert!(scheduler.is_stopped());
        let err = scheduler.run().await.unwrap_err();
        assert_eq!(err, SchedulerError::Inconsistent("forced".into()));
        assert!(scheduler.lock().waiters.is_empty());

        scheduler.clear();
        assert!(scheduler.aborted().is_none());
    }

    #[test]
    fn building_outside_a_runtime_fails() {
        let err = Scheduler::<()>::builder().build().unwrap_err();
        assert_eq!(err, SchedulerError::NoRuntime);
    }
}

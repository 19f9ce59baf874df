//! Completion & Status Tracking.
//!
//! Every terminal transition goes through `on_task_terminal`: the record is
//! moved to its log and the matching observer is queued, followed by a
//! `Recheck` that re-triggers admission and checks whole-run completion once
//! the observer has run.

use tracing::debug;

use super::{Effect, EngineState, admission};
use crate::config::SchedulerConfig;
use crate::domain::{Outcome, SchedulerError, SequenceId, StatusNotification, StatusSnapshot};
use crate::queue::Collection;

/// Settle task `id` with `notification`.
///
/// `from` overrides the source collection (cancellation). With an override
/// no `Recheck` is queued: no consumption, no completion check; the caller
/// decides how the pipeline continues.
pub(crate) fn on_task_terminal<P>(
    state: &mut EngineState<P>,
    config: &SchedulerConfig,
    notification: StatusNotification,
    id: SequenceId,
    from: Option<Collection>,
) -> Result<(), SchedulerError> {
    let source = from.unwrap_or(Collection::InFlight);
    let mut record = state.store.take(source, id).ok_or_else(|| {
        SchedulerError::Inconsistent(format!("{id} is not in {source}"))
    })?;

    record.finish(notification.outcome);
    let mode = record.mode;
    let task = std::sync::Arc::clone(&record.task);
    state.store.push_finished(record);

    let snapshot = StatusSnapshot::for_task(
        &notification,
        mode,
        state.store.counts(),
        state.store.restarts(),
    );
    if config.debug {
        debug!(task = %id, outcome = %notification.outcome, remaining = snapshot.counts.remaining, "task settled");
    }
    state.last_notification = Some((notification.clone(), mode));

    match notification.outcome {
        Outcome::Success => state.emit(Effect::Progress { snapshot, task }),
        Outcome::Error | Outcome::Canceled => state.emit(Effect::Failed { snapshot, task }),
    }

    if from.is_none() {
        state.emit(Effect::Recheck);
    }
    Ok(())
}

/// Continue the pipeline after an observer ran: consume unless manual, then
/// check for completion.
///
/// Completion is left to the last queued recheck, so an observer still
/// waiting in the outbox can add work before the run is declared done.
pub(crate) fn recheck<P>(
    state: &mut EngineState<P>,
    config: &SchedulerConfig,
) -> Result<(), SchedulerError> {
    if !config.manual_consume {
        admission::consume(state, config)?;
    }
    let later = state.outbox.iter().any(|e| matches!(e, Effect::Recheck));
    if !later {
        check_completion(state, config);
    }
    Ok(())
}

/// Queue the completion observer if the run just drained.
///
/// Fires at most once per run; `start()` and `add()` open a new run.
pub(crate) fn check_completion<P>(state: &mut EngineState<P>, config: &SchedulerConfig) {
    let remaining = state.store.remaining();
    if config.debug {
        debug!(remaining, "completion check");
    }
    if remaining > 0 || state.completion_signaled {
        return;
    }
    state.completion_signaled = true;

    let counts = state.store.counts();
    let restarts = state.store.restarts();
    let snapshot = match &state.last_notification {
        Some((notification, mode)) => {
            StatusSnapshot::for_task(notification, *mode, counts, restarts)
        }
        None => StatusSnapshot::idle(counts, restarts),
    };
    if config.debug {
        debug!(finished = counts.finished, total = counts.total, "run completed");
    }
    state.emit(Effect::Completed(snapshot));
}

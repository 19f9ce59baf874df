//! Admission Engine: moves eligible tasks from `pending` into `inFlight`.
//!
//! Rule: the head of `pending` is admitted when `inFlight` is empty, or when
//! both the head and the first in-flight task are concurrent. A barrier head
//! therefore waits for an empty `inFlight`, and an in-flight barrier blocks
//! everything behind it.

use tracing::debug;

use super::execution::Dispatch;
use super::{Effect, EngineState};
use crate::config::SchedulerConfig;
use crate::domain::{AdmissionMode, SchedulerError};
use crate::queue::QueueStore;

pub fn can_admit_next<P>(store: &QueueStore<P>) -> bool {
    let Some(head) = store.pending_head() else {
        return false;
    };
    match store.in_flight_head() {
        None => true,
        Some(representative) => {
            head.mode == AdmissionMode::Concurrent
                && representative.mode == AdmissionMode::Concurrent
        }
    }
}

/// Admit as many pending tasks as the rule allows.
///
/// Returns the number admitted. Paused engines admit nothing. Stops at the
/// first refusal and leaves the rest of `pending` for the next trigger.
pub(crate) fn consume<P>(
    state: &mut EngineState<P>,
    config: &SchedulerConfig,
) -> Result<usize, SchedulerError> {
    if let Some(err) = &state.aborted {
        return Err(err.clone());
    }
    if state.paused {
        if config.debug {
            debug!("consume skipped: paused");
        }
        return Ok(0);
    }
    ensure_in_flight_invariant(&state.store)?;

    let mut admitted = 0;
    while state.store.pending_len() > 0 {
        if !can_admit_next(&state.store) {
            if config.debug
                && let Some(head) = state.store.pending_head()
            {
                debug!(
                    task = %head.sequence_id,
                    mode = %head.mode,
                    in_flight = state.store.in_flight_len(),
                    "admission refused, waiting for in-flight tasks"
                );
            }
            break;
        }

        let Some(mut record) = state.store.pop_pending() else {
            break;
        };
        record.start_attempt();
        let dispatch = Dispatch::for_record(&record);
        if config.debug {
            debug!(task = %record.sequence_id, mode = %record.mode, attempt = record.attempts, "admitted");
        }
        state.store.push_in_flight(record);
        ensure_in_flight_invariant(&state.store)?;

        state.emit(Effect::Dispatch(dispatch));
        admitted += 1;
    }
    Ok(admitted)
}

fn ensure_in_flight_invariant<P>(store: &QueueStore<P>) -> Result<(), SchedulerError> {
    if store.barrier_conflict() {
        return Err(SchedulerError::Inconsistent(format!(
            "barrier task shares in-flight with {} other task(s)",
            store.in_flight_len() - 1
        )));
    }
    Ok(())
}

//! Task record: metadata + the shared task.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::TaskState;
use crate::domain::{AdmissionMode, Outcome, SequenceId, Task};

/// Metadata + task for one registration.
///
/// Design:
/// - A record lives in exactly one collection of the store at a time.
/// - All state transitions happen here.
/// - The same `Arc<Task>` may be registered twice; each registration gets
///   its own record and `sequence_id`.
pub struct TaskRecord<P> {
    pub sequence_id: SequenceId,
    pub mode: AdmissionMode,
    pub task: Arc<Task<P>>,
    pub state: TaskState,

    /// Number of admissions so far. A resolver is bound to the admission that
    /// created it, so one from before a restart cannot settle the new one.
    pub attempts: u32,

    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl<P> TaskRecord<P> {
    pub fn new(sequence_id: SequenceId, mode: AdmissionMode, task: Arc<Task<P>>) -> Self {
        Self {
            sequence_id,
            mode,
            task,
            state: TaskState::Pending,
            attempts: 0,
            dispatched_at: None,
            finished_at: None,
        }
    }

    /// Mark as admitted into `inFlight` (increments attempts).
    pub fn start_attempt(&mut self) {
        self.state = TaskState::Dispatched;
        self.attempts += 1;
        self.dispatched_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn await_resolution(&mut self) {
        if self.state == TaskState::Dispatched {
            self.state = TaskState::AwaitingResolution;
        }
    }

    pub fn finish(&mut self, outcome: Outcome) {
        self.state = TaskState::terminal_for(outcome);
        self.finished_at = Some(Utc::now());
    }

    /// Back to `pending` (restart).
    pub fn requeue(&mut self) {
        self.state = TaskState::Pending;
        self.dispatched_at = None;
        self.finished_at = None;
    }

    /// Does this record belong to the given admission of `sequence_id`?
    pub fn is_attempt(&self, sequence_id: SequenceId, attempt: u32) -> bool {
        self.sequence_id == sequence_id && self.attempts == attempt && self.state.is_in_flight()
    }
}

//! Task state machine for the store.

use serde::{Deserialize, Serialize};

use crate::domain::Outcome;

/// Per-record state.
///
/// State transitions:
/// - Pending -> Dispatched -> Succeeded | Failed | Canceled
/// - Pending -> Dispatched -> AwaitingResolution -> Succeeded | Failed | Canceled
/// - any -> Pending (restart)
///
/// `Dispatched` and `AwaitingResolution` are exactly the states of a record
/// held by `inFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in `pending`.
    Pending,

    /// Admitted; the body has been scheduled or is running.
    Dispatched,

    /// The body asked for deferred completion and returned; waiting for the
    /// resolver.
    AwaitingResolution,

    Succeeded,

    Failed,

    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Canceled
        )
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::Dispatched | TaskState::AwaitingResolution)
    }

    pub(crate) fn terminal_for(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => TaskState::Succeeded,
            Outcome::Error => TaskState::Failed,
            Outcome::Canceled => TaskState::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::success(Outcome::Success, TaskState::Succeeded)]
    #[case::error(Outcome::Error, TaskState::Failed)]
    #[case::canceled(Outcome::Canceled, TaskState::Canceled)]
    fn outcomes_map_to_terminal_states(#[case] outcome: Outcome, #[case] expected: TaskState) {
        let state = TaskState::terminal_for(outcome);
        assert_eq!(state, expected);
        assert!(state.is_terminal());
        assert!(!state.is_in_flight());
    }

    #[test]
    fn in_flight_states_are_not_terminal() {
        for state in [TaskState::Dispatched, TaskState::AwaitingResolution] {
            assert!(state.is_in_flight());
            assert!(!state.is_terminal());
        }
        assert!(!TaskState::Pending.is_in_flight());
    }
}

//! Errors - scheduler-level error taxonomy.
//!
//! Task failures are not errors of the scheduler: they are recorded as
//! `Outcome::Error` and surface through the error observer and the `failed`
//! collection. Only the variants below ever come back as `Err`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Malformed input (unknown mode/placement/outcome spelling, etc.).
    /// Fatal to the call only.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The bookkeeping contradicted itself. The run is aborted.
    #[error("internal consistency failure: {0}")]
    Inconsistent(String),

    /// Tasks are spawned on tokio; building outside a runtime cannot work.
    #[error("no tokio runtime is available to run tasks")]
    NoRuntime,

    /// The scheduler went away before the awaited run finished.
    #[error("scheduler dropped before the run completed")]
    Dropped,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Config(e.to_string())
    }
}

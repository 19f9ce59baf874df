//! Admission modes and insertion placement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::SchedulerError;

/// How a task is admitted relative to the tasks already in flight.
///
/// - `Concurrent`: may overlap with any other concurrent task.
/// - `Barrier`: needs `inFlight` to itself. Everything admitted before it must
///   have finished, and nothing queued after it starts until it finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    #[default]
    #[serde(alias = "async")]
    Concurrent,
    #[serde(alias = "defer")]
    Barrier,
}

impl AdmissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionMode::Concurrent => "concurrent",
            AdmissionMode::Barrier => "barrier",
        }
    }

    pub fn is_barrier(self) -> bool {
        matches!(self, AdmissionMode::Barrier)
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" | "async" => Ok(AdmissionMode::Concurrent),
            "barrier" | "defer" => Ok(AdmissionMode::Barrier),
            other => Err(SchedulerError::InvalidArgument(format!(
                "unknown admission mode: {other:?}"
            ))),
        }
    }
}

/// Which end of `pending` a new task enters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Appended; tasks run in insertion order (queue-like).
    #[default]
    #[serde(alias = "bottom")]
    Tail,
    /// Prepended; the most recent insertion runs first (stack-like).
    #[serde(alias = "top")]
    Head,
}

impl FromStr for Placement {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tail" | "bottom" => Ok(Placement::Tail),
            "head" | "top" => Ok(Placement::Head),
            other => Err(SchedulerError::InvalidArgument(format!(
                "unknown placement: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::canonical("concurrent", AdmissionMode::Concurrent)]
    #[case::legacy_async("async", AdmissionMode::Concurrent)]
    #[case::canonical_barrier("barrier", AdmissionMode::Barrier)]
    #[case::legacy_defer("DEFER", AdmissionMode::Barrier)]
    fn parses_admission_modes(#[case] input: &str, #[case] expected: AdmissionMode) {
        assert_eq!(input.parse::<AdmissionMode>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "sometimes".parse::<AdmissionMode>().unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    }

    #[rstest]
    #[case::tail("tail", Placement::Tail)]
    #[case::bottom("bottom", Placement::Tail)]
    #[case::head("head", Placement::Head)]
    #[case::top("top", Placement::Head)]
    fn parses_placements(#[case] input: &str, #[case] expected: Placement) {
        assert_eq!(input.parse::<Placement>().unwrap(), expected);
    }

    #[test]
    fn deserializes_legacy_spelling() {
        let mode: AdmissionMode = serde_json::from_str("\"defer\"").unwrap();
        assert_eq!(mode, AdmissionMode::Barrier);
    }
}

//! Status views handed to observers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mode::AdmissionMode;
use super::outcome::{Outcome, StatusNotification};

/// Aggregate counts over the four collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Size of `pending` when the run first started; `None` before that.
    pub start: Option<usize>,
    /// `pending + in_flight`.
    pub remaining: usize,
    /// `succeeded + failed`.
    pub finished: usize,
    pub pending: usize,
    pub in_flight: usize,
    /// Tasks registered since construction or the last clear.
    pub total: usize,
}

/// Read-only summary of run progress.
///
/// `outcome`/`result` come from the notification that triggered the snapshot
/// and are empty for snapshots taken outside a task transition (e.g. the
/// completion check done by `start()` on an empty run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub result: Value,
    pub mode: Option<AdmissionMode>,
    pub counts: Counts,
    pub restarts: u32,
}

impl StatusSnapshot {
    pub fn idle(counts: Counts, restarts: u32) -> Self {
        Self {
            outcome: None,
            result: Value::Null,
            mode: None,
            counts,
            restarts,
        }
    }

    pub fn for_task(
        notification: &StatusNotification,
        mode: AdmissionMode,
        counts: Counts,
        restarts: u32,
    ) -> Self {
        Self {
            outcome: Some(notification.outcome),
            result: notification.result.clone(),
            mode: Some(mode),
            counts,
            restarts,
        }
    }

    /// True when nothing is pending or in flight.
    pub fn is_drained(&self) -> bool {
        self.counts.remaining == 0
    }
}

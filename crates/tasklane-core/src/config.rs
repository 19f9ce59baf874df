//! Scheduler configuration.
//!
//! Immutable once the scheduler is built. Every field has a default, so a
//! JSON document only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::domain::{AdmissionMode, Placement, SchedulerError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Mode for tasks added without an explicit one.
    pub default_mode: AdmissionMode,

    /// Ignore per-call modes and always use `default_mode`.
    pub enforce_default_mode: bool,

    /// The caller drives `consume()`; neither `start()` nor task completion
    /// admits anything on its own.
    pub manual_consume: bool,

    /// Placement for tasks added without an explicit one.
    pub default_placement: Placement,

    /// Verbose tracing of admission and completion. No behavioural effect.
    pub debug: bool,
}

impl SchedulerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, SchedulerError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn mode_for(&self, requested: Option<AdmissionMode>) -> AdmissionMode {
        if self.enforce_default_mode {
            return self.default_mode;
        }
        requested.unwrap_or(self.default_mode)
    }

    pub fn placement_for(&self, requested: Option<Placement>) -> Placement {
        requested.unwrap_or(self.default_placement)
    }
}

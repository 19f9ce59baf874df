//! Outcome model: how a task ended and what it produced.
//!
//! This module does not know about queues or observers. It only defines the
//! "shape" of a terminal transition so the engine can route it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::SchedulerError;

/// Terminal classification of a task.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / ERROR / CANCELED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Error,
    Canceled,
}

impl Outcome {
    /// ERROR and CANCELED both land in the `failed` log.
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Canceled => "canceled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            "canceled" | "cancelled" => Ok(Outcome::Canceled),
            other => Err(SchedulerError::InvalidArgument(format!(
                "unknown outcome: {other:?}"
            ))),
        }
    }
}

/// What a task's completion reports: its outcome plus a result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub outcome: Outcome,

    #[serde(default)]
    pub result: Value,
}

impl StatusNotification {
    pub fn new(outcome: Outcome, result: impl Into<Value>) -> Self {
        Self {
            outcome,
            result: result.into(),
        }
    }

    pub fn success(result: impl Into<Value>) -> Self {
        Self::new(Outcome::Success, result)
    }

    pub fn error(result: impl Into<Value>) -> Self {
        Self::new(Outcome::Error, result)
    }

    pub fn canceled() -> Self {
        Self::new(Outcome::Canceled, Value::Null)
    }
}

/// A task's own failure (the value it "throws").
///
/// `into_result` is what ends up in the notification: the attached payload if
/// there is one, otherwise the message as a JSON string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
    payload: Option<Value>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn into_result(self) -> Value {
        self.payload.unwrap_or(Value::String(self.message))
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("json: {e}"))
    }
}

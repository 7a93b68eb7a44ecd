//! Termination & Reporting
//!
//! Classifies how a run ended and, for a successful run, hands the answer to
//! the reporter exactly once. Retrying a submission is the reporter's concern.

use super::core::LoopError;
use crate::report::{ReportAck, Reporter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Loop driver states
///
/// `AwaitingAction` ⇄ `Dispatching` while the run is live; the three `Done*`
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    AwaitingAction,
    Dispatching,
    DoneSuccess,
    DoneNoSolution,
    DoneError,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DoneSuccess | Self::DoneNoSolution | Self::DoneError
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingAction => "AWAITING_ACTION",
            Self::Dispatching => "DISPATCHING",
            Self::DoneSuccess => "DONE_SUCCESS",
            Self::DoneNoSolution => "DONE_NO_SOLUTION",
            Self::DoneError => "DONE_ERROR",
        };
        f.write_str(s)
    }
}

/// How a run ended
#[derive(Debug)]
pub enum Outcome {
    /// The model produced a final answer
    Success { answer: String },

    /// The budget ran out before a final answer
    NoSolution,

    /// Malformed output, unknown action, tool or model failure
    Error(LoopError),
}

impl Outcome {
    pub fn state(&self) -> LoopState {
        match self {
            Self::Success { .. } => LoopState::DoneSuccess,
            Self::NoSolution => LoopState::DoneNoSolution,
            Self::Error(_) => LoopState::DoneError,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Success { answer } => Some(answer),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoopError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// What happened to the answer after the loop stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// The run did not succeed, so there was nothing to submit
    NotAttempted,

    /// Submission was disabled for this run
    Skipped,

    Accepted { ack: ReportAck },

    Failed { error: String },
}

/// Answer as it goes on the wire
///
/// A JSON array or object (e.g. a list of datacenter ids) is submitted as JSON;
/// anything else is submitted as the trimmed string.
pub fn answer_payload(answer: &str) -> Value {
    let trimmed = answer.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if value.is_array() || value.is_object() {
                return value;
            }
        }
    }
    Value::String(trimmed.to_string())
}

/// Submit the answer of a successful run
pub async fn conclude(
    reporter: Option<&dyn Reporter>,
    task: &str,
    outcome: &Outcome,
) -> SubmissionStatus {
    let Some(answer) = outcome.answer() else {
        return SubmissionStatus::NotAttempted;
    };
    let Some(reporter) = reporter else {
        tracing::info!("Submission disabled; answer for task '{}' not sent", task);
        return SubmissionStatus::Skipped;
    };

    match reporter.submit(task, &answer_payload(answer)).await {
        Ok(ack) => SubmissionStatus::Accepted { ack },
        Err(e) => SubmissionStatus::Failed {
            error: e.to_string(),
        },
    }
}

//! Tool output and error types

use serde::{Deserialize, Serialize};

/// Output from a query tool
///
/// Tools either return free text (e.g. a list of names) or a structured
/// JSON payload (e.g. rows from a database query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text reply
    Text(String),

    /// Structured reply
    Json(serde_json::Value),
}

impl ToolOutput {
    /// Create a text output
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a JSON output
    pub fn json(data: serde_json::Value) -> Self {
        Self::Json(data)
    }

    /// Render the output as observation text for the conversation.
    ///
    /// JSON strings are unwrapped so the model sees `KRAKOW` rather than
    /// `"KRAKOW"`; other JSON values are rendered compactly.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(serde_json::Value::String(s)) => s.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// Returns true if the tool produced no content
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Json(serde_json::Value::Null) => true,
            Self::Json(serde_json::Value::String(s)) => s.trim().is_empty(),
            Self::Json(serde_json::Value::Array(items)) => items.is_empty(),
            Self::Json(_) => false,
        }
    }
}

/// Tool-specific errors
///
/// These describe transport-level failures. A tool that answers "nothing
/// found" succeeds with that text; it does not return an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Tool endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid tool response: {0}")]
    InvalidResponse(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

//! Tool Dispatcher
//!
//! Maps an action kind to the query tool that serves it. The dispatcher holds
//! no per-run state and is shared between sessions behind an `Arc`.

pub mod http;

pub use http::{normalize_target, CentralaQueryTool};

use crate::agent::{Action, ActionKind};
use crate::secrets::scrub;
use sdk::{QueryTool, ToolError, ToolOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatch failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// No tool is registered for this kind
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The tool ran and failed; the error is passed through unchanged
    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Output of one dispatch, tied to the action that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub action: Action,
    pub output: ToolOutput,
}

impl ToolResult {
    /// Observation text appended to the conversation
    pub fn observation(&self) -> String {
        let body = if self.output.is_empty() {
            "(no results)".to_string()
        } else {
            self.output.render()
        };
        format!(
            "Result of {} for '{}':\n{}",
            self.action.kind, self.action.target, body
        )
    }
}

/// Registry of query tools keyed by action kind
#[derive(Default, Clone)]
pub struct ToolDispatcher {
    tools: HashMap<ActionKind, Arc<dyn QueryTool>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_tool(mut self, kind: ActionKind, tool: Arc<dyn QueryTool>) -> Self {
        self.register(kind, tool);
        self
    }

    /// Register a tool for a kind, replacing any previous one
    pub fn register(&mut self, kind: ActionKind, tool: Arc<dyn QueryTool>) {
        debug!("Registering tool '{}' for {}", tool.name(), kind);
        self.tools.insert(kind, tool);
    }

    pub fn resolve(&self, kind: &ActionKind) -> Option<&Arc<dyn QueryTool>> {
        self.tools.get(kind)
    }

    pub fn supports(&self, kind: &ActionKind) -> bool {
        self.tools.contains_key(kind)
    }

    /// Registered kinds in canonical order
    pub fn available_kinds(&self) -> Vec<&ActionKind> {
        let mut kinds: Vec<&ActionKind> = self.tools.keys().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    /// Run a non-final action against its tool
    pub async fn dispatch(&self, action: &Action) -> Result<ToolResult, DispatchError> {
        let Some(tool) = self.resolve(&action.kind) else {
            warn!("Unknown action requested: {}", action.kind);
            return Err(DispatchError::UnknownAction(action.kind.to_string()));
        };

        debug!("Dispatching {} via '{}': {}", action.kind, tool.name(), action.target);

        match tool.invoke(&action.target).await {
            Ok(output) => Ok(ToolResult {
                action: action.clone(),
                output,
            }),
            Err(source) => {
                warn!(
                    "Tool '{}' failed: {}",
                    tool.name(),
                    scrub(&source.to_string())
                );
                Err(DispatchError::Tool {
                    tool: tool.name().to_string(),
                    source,
                })
            }
        }
    }
}

//! Sleuth SDK
//!
//! Shared library providing traits, types, and errors for Sleuth components.
//! This crate is used by the engine and by query tool implementations.

/// Error types and handling
pub mod errors;

/// Query tool capability trait
pub mod query_tool;

/// Tool output and error types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, SleuthErrorExt};
pub use query_tool::QueryTool;
pub use types::{ToolError, ToolOutput};

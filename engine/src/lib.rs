//! Sleuth Engine Library
//!
//! This library provides the investigation loop and everything around it.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// LLM provider abstraction layer
pub mod llm;

/// Investigation loop: session, action parser, guard, termination
pub mod agent;

/// Query tools and the dispatcher
pub mod tools;

/// Answer submission
pub mod report;

/// Persisted run records
pub mod history;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

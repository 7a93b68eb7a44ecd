//! CLI interface for Sleuth
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sleuth investigation engine
///
/// Runs model-directed investigations against query endpoints and submits
/// the final answer to the scoring endpoint.
#[derive(Parser, Debug)]
#[command(name = "sleuth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a configured investigation
    Run {
        /// Investigation name from config.toml
        name: String,

        /// Override the configured query budget
        #[arg(long)]
        budget: Option<u32>,

        /// Do not submit the final answer
        #[arg(long)]
        no_submit: bool,
    },

    /// Submit an answer directly to the scoring endpoint
    Report {
        /// Task name
        #[arg(long)]
        task: String,

        /// Answer; JSON arrays and objects are sent as JSON
        answer: String,
    },

    /// List configured investigations
    List,

    /// Show recent runs
    History {
        /// Number of runs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the full transcript of a run
    Replay {
        /// Run ID (or a unique prefix)
        run_id: String,
    },

    /// Check configuration, secrets and provider health
    Doctor,

    /// Manage secrets in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a secret (value is read from stdin)
    Set {
        /// Secret key (e.g. anthropic_api_key)
        key: String,
    },

    /// Delete a secret
    Delete {
        /// Secret key
        key: String,
    },
}

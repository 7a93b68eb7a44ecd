//! Error types and handling
//!
//! This module provides the engine-level error type shared by the engine and
//! tool implementations. All errors implement the `SleuthErrorExt` trait which
//! provides user-friendly hints.
//!
//! Loop-level failures (malformed model output, unknown actions) live next to
//! the investigation loop; this type covers the surrounding infrastructure.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{EngineError, SleuthErrorExt};
//!
//! let error = EngineError::UnknownInvestigation("gps".to_string());
//! assert_eq!(
//!     error.user_hint(),
//!     "Run 'sleuth list' to see the configured investigations"
//! );
//! ```

use thiserror::Error;

/// Trait for Sleuth error extensions
///
/// The hint is safe to display to end users and never contains secrets.
pub trait SleuthErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown investigation: {0}")]
    UnknownInvestigation(String),

    // Tool errors
    #[error("Tool not configured: {0}")]
    ToolNotConfigured(String),

    // History errors
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid run id '{0}': expected a run id or a prefix of one")]
    InvalidRunId(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SleuthErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::UnknownInvestigation(_) => {
                "Run 'sleuth list' to see the configured investigations"
            }

            Self::ToolNotConfigured(_) => "Add a [tools.<name>] section with a url to config.toml",

            Self::RunNotFound(_) => "Run 'sleuth history' to list recorded runs",
            Self::InvalidRunId(_) => "Use a run id as shown by 'sleuth history'",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::SecretNotFound(_) => {
                "Set the secret with 'sleuth secret set <key>' or export it as an environment variable"
            }

            Self::Io(_) => "File system operation failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_never_empty() {
        let errors = vec![
            EngineError::Config("bad".to_string()),
            EngineError::UnknownInvestigation("x".to_string()),
            EngineError::ToolNotConfigured("gps".to_string()),
            EngineError::RunNotFound("abc".to_string()),
            EngineError::InvalidRunId("../x".to_string()),
            EngineError::KeyringError("locked".to_string()),
            EngineError::SecretNotFound("centrala_api_key".to_string()),
        ];

        for error in errors {
            assert!(!error.user_hint().is_empty(), "empty hint for {:?}", error);
        }
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: EngineError = io.into();
        assert!(matches!(error, EngineError::Io(_)));
        assert!(error.to_string().contains("missing"));
    }
}

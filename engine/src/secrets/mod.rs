pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// SecretManager resolves API keys for model providers, query tools and the
/// scoring endpoint.
///
/// Lookup order for a key such as `anthropic_api_key`:
/// 1. Environment variable with the upper-cased name (`ANTHROPIC_API_KEY`)
/// 2. OS keychain entry under the manager's service name
///
/// Runs are unattended, so a missing secret is an error rather than a prompt.
/// Use `sleuth secret set <key>` to store one in the keychain.
///
/// The SecretManager also scrubs secrets from text before it reaches logs,
/// error messages or persisted run records.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting common secret formats, with their replacement.
static SECRET_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

/// Patterns match:
/// - OpenAI/Anthropic API keys: sk-..., sk-ant-...
/// - Bearer tokens
/// - `apikey` fields in JSON bodies or query strings (value only)
fn get_secret_patterns() -> &'static Vec<(Regex, &'static str)> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid API key pattern"),
                "[REDACTED]",
            ),
            (
                Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
                "[REDACTED]",
            ),
            (
                Regex::new(r#"(?i)("?apikey"?\s*[:=]\s*"?)[^"\s,&}]+"#)
                    .expect("Invalid apikey pattern"),
                "${1}[REDACTED]",
            ),
        ]
    })
}

impl SecretManager {
    /// Creates a new SecretManager with the given service name.
    ///
    /// The service name is used to namespace secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Environment variable consulted before the keychain
    pub fn env_var_name(key: &str) -> String {
        key.to_ascii_uppercase()
    }

    /// Retrieves a secret from the environment or the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::SecretNotFound` if neither source has the key and
    /// `EngineError::KeyringError` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Ok(value) = std::env::var(Self::env_var_name(key)) {
            if !value.trim().is_empty() {
                tracing::debug!("Retrieved secret '{}' from environment", key);
                return Ok(value);
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::SecretNotFound(key.to_string())),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Deletes a secret from the OS keychain.
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.delete_password().map_err(|e| match e {
            keyring::Error::NoEntry => EngineError::SecretNotFound(key.to_string()),
            other => {
                EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, other))
            }
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Checks whether a secret is available from either source.
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }

    /// Scrubs secrets from text by replacing them with [REDACTED].
    ///
    /// # Examples
    /// ```
    /// use sleuth_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Free-function form of [`SecretManager::scrub`] for call sites without a manager.
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for (pattern, replacement) in get_secret_patterns() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

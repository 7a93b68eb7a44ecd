//! Configuration management
//!
//! This module handles loading, validation, and management of the Sleuth configuration.
//! Configuration is stored in TOML format at ~/.sleuth/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: LLM provider settings and the per-call timeout
//! - **report**: Scoring endpoint and retry policy
//! - **tools**: Query endpoints (people, places, database, gps)
//! - **investigations**: Named investigations with their budget, prompts and tools
//!
//! # Examples
//!
//! ```no_run
//! use sleuth_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Default provider: {}", config.llm.default_provider);
//! for investigation in &config.investigations {
//!     println!("{} (budget {})", investigation.name, investigation.budget);
//! }
//! # Ok(())
//! # }
//! ```

use crate::agent::{ActionKind, RepeatPolicy};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Answer submission settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Query tool endpoints
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Named investigations
    #[serde(default)]
    pub investigations: Vec<InvestigationConfig>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Runs older than this many days are pruned from history
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            history_retention_days: default_history_retention_days(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider tried first (anthropic, openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-provider timeout for a single model call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            request_timeout_secs: default_request_timeout(),
            anthropic: AnthropicConfig::default(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Upper bound on generated tokens per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    // Note: API key stored in OS keychain or ANTHROPIC_API_KEY, not in config
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Register Ollama as a fallback provider
    #[serde(default)]
    pub enabled: bool,
}

/// Scoring endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Endpoint that receives `{task, apikey, answer}`
    #[serde(default = "default_report_url")]
    pub url: String,

    /// Name of the secret holding the API key
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,

    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            url: default_report_url(),
            api_key_secret: default_api_key_secret(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Query tool endpoints, one per action kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Person lookup (`query-people`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people: Option<ToolEndpointConfig>,

    /// Place lookup (`query-places`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub places: Option<ToolEndpointConfig>,

    /// SQL-style database (`query-db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<ToolEndpointConfig>,

    /// GPS lookup (`query-gps`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<ToolEndpointConfig>,
}

impl ToolsConfig {
    /// Endpoint configured for an action kind, if any
    pub fn endpoint_for(&self, kind: &ActionKind) -> Option<&ToolEndpointConfig> {
        match kind {
            ActionKind::QueryPeople => self.people.as_ref(),
            ActionKind::QueryPlaces => self.places.as_ref(),
            ActionKind::QueryDb => self.database.as_ref(),
            ActionKind::QueryGps => self.gps.as_ref(),
            ActionKind::FinalAnswer | ActionKind::Unrecognized(_) => None,
        }
    }
}

/// One HTTP query endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEndpointConfig {
    pub url: String,

    /// Task name sent along with the query; omitted from the body when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Fold Polish diacritics and upper-case targets before sending
    #[serde(default)]
    pub normalize_target: bool,
}

/// A named investigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    pub name: String,

    /// Task name used when submitting the answer
    pub task: String,

    /// Maximum number of model iterations
    #[serde(default = "default_budget")]
    pub budget: u32,

    #[serde(default)]
    pub repeat_policy: RepeatPolicy,

    pub system_prompt: String,

    pub initial_observation: String,

    /// Action kinds this investigation may dispatch (e.g. "query-db")
    #[serde(default)]
    pub tools: Vec<String>,

    /// Trim the transcript sent to the model to roughly this many tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_token_limit: Option<usize>,
}

impl InvestigationConfig {
    /// Parsed action kinds; unknown names are skipped (validation rejects them)
    pub fn tool_kinds(&self) -> Vec<ActionKind> {
        self.tools
            .iter()
            .map(|t| ActionKind::parse(t))
            .filter(ActionKind::is_query)
            .collect()
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.sleuth")
}

fn default_history_retention_days() -> i64 {
    30
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_report_url() -> String {
    "https://centrala.ag3nts.org/report".to_string()
}

fn default_api_key_secret() -> String {
    "centrala_api_key".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_budget() -> u32 {
    10
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.sleuth/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {}", path.display());

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.sleuth/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".sleuth").join("config.toml"))
    }

    /// Look up an investigation by name
    pub fn investigation(&self, name: &str) -> Result<&InvestigationConfig, EngineError> {
        self.investigations
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| EngineError::UnknownInvestigation(name.to_string()))
    }

    /// SQLite database holding persisted run records
    pub fn history_db_path(&self) -> PathBuf {
        self.core.data_dir.join("history.db")
    }

    /// Create a default configuration
    ///
    /// Ships two sample investigations: the datacenter SQL hunt and the
    /// people/places search.
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            report: ReportConfig::default(),
            tools: ToolsConfig {
                people: Some(ToolEndpointConfig {
                    url: "https://centrala.ag3nts.org/people".to_string(),
                    task: None,
                    normalize_target: true,
                }),
                places: Some(ToolEndpointConfig {
                    url: "https://centrala.ag3nts.org/places".to_string(),
                    task: None,
                    normalize_target: true,
                }),
                database: Some(ToolEndpointConfig {
                    url: "https://centrala.ag3nts.org/apidb".to_string(),
                    task: Some("database".to_string()),
                    normalize_target: false,
                }),
                gps: None,
            },
            investigations: vec![
                InvestigationConfig {
                    name: "datacenters".to_string(),
                    task: "database".to_string(),
                    budget: 12,
                    repeat_policy: RepeatPolicy::RefuseAndReprompt,
                    system_prompt: "You are an expert SQL programmer. Format every reply with \
                                    the sections ACTION, QUERY, REASONING and IS_FINAL. Use \
                                    ACTION: query-db to run a query. When you know the answer, \
                                    set IS_FINAL: true and put the answer in QUERY."
                        .to_string(),
                    initial_observation: "Find the ids of active datacenters managed by \
                                          employees who are currently on leave. Start by \
                                          listing the tables."
                        .to_string(),
                    tools: vec!["query-db".to_string()],
                    context_token_limit: None,
                },
                InvestigationConfig {
                    name: "barbara".to_string(),
                    task: "loop".to_string(),
                    budget: 20,
                    repeat_policy: RepeatPolicy::RefuseAndReprompt,
                    system_prompt: "You are a detective. Reply with ACTION (query-people or \
                                    query-places), QUERY (one name or one city, upper-case, no \
                                    diacritics) and REASONING. When you know the city, reply \
                                    with ACTION: final-answer and the city in QUERY."
                        .to_string(),
                    initial_observation: "Find the city where Barbara Zawadzka is hiding."
                        .to_string(),
                    tools: vec!["query-people".to_string(), "query-places".to_string()],
                    context_token_limit: Some(6000),
                },
            ],
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and default provider
    /// - Rejects zero budgets, duplicate names and unconfigured tools
    /// - Expands ~ in the data directory and creates it
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.history_retention_days <= 0 {
            return Err(EngineError::Config(format!(
                "history_retention_days must be positive, got {}",
                self.core.history_retention_days
            )));
        }

        let valid_providers = ["anthropic", "openai", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.report.max_attempts == 0 {
            return Err(EngineError::Config(
                "report.max_attempts must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for investigation in &self.investigations {
            if !names.insert(investigation.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Duplicate investigation name '{}'",
                    investigation.name
                )));
            }

            if investigation.budget == 0 {
                return Err(EngineError::Config(format!(
                    "Investigation '{}' must have a budget greater than 0",
                    investigation.name
                )));
            }

            for tool in &investigation.tools {
                let kind = ActionKind::parse(tool);
                if !kind.is_query() {
                    return Err(EngineError::Config(format!(
                        "Investigation '{}' references unknown tool '{}'",
                        investigation.name, tool
                    )));
                }
                if self.tools.endpoint_for(&kind).is_none() {
                    return Err(EngineError::Config(format!(
                        "Investigation '{}' uses '{}' but no endpoint is configured for it",
                        investigation.name, tool
                    )));
                }
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

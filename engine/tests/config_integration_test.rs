//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with path expansion and directory creation.

use std::fs;

use sleuth_engine::agent::{ActionKind, RepeatPolicy};
use sleuth_engine::config::Config;

fn config_toml(data_dir: &std::path::Path, investigations: &str) -> String {
    format!(
        r#"
[core]
log_level = "debug"
data_dir = "{}"

[llm]
default_provider = "ollama"
request_timeout_secs = 30

[llm.ollama]
base_url = "http://localhost:11434"
model = "llama3.1:8b"

[report]
url = "http://localhost:9000/report"
max_attempts = 2

[tools.people]
url = "http://localhost:9000/people"
normalize_target = true

[tools.places]
url = "http://localhost:9000/places"
normalize_target = true

[tools.database]
url = "http://localhost:9000/apidb"
task = "database"

{}
"#,
        data_dir.display(),
        investigations
    )
}

const BARBARA: &str = r#"
[[investigations]]
name = "barbara"
task = "loop"
budget = 15
repeat_policy = "count-and-continue"
system_prompt = "Find Barbara."
initial_observation = "Seen in KRAKOW."
tools = ["query-people", "query-places"]
"#;

#[test]
fn test_config_toml_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let path = dir.path().join("config.toml");
    fs::write(&path, config_toml(&data_dir, BARBARA)).unwrap();

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.exists(), "data_dir should be created");
    assert_eq!(config.llm.default_provider, "ollama");
    assert_eq!(config.llm.request_timeout_secs, 30);
    assert_eq!(config.report.max_attempts, 2);
    assert_eq!(config.report.api_key_secret, "centrala_api_key");

    let barbara = config.investigation("barbara").unwrap();
    assert_eq!(barbara.budget, 15);
    assert_eq!(barbara.repeat_policy, RepeatPolicy::CountAndContinue);
    assert_eq!(
        barbara.tool_kinds(),
        vec![ActionKind::QueryPeople, ActionKind::QueryPlaces]
    );
    assert_eq!(
        config.tools.endpoint_for(&ActionKind::QueryDb).unwrap().task.as_deref(),
        Some("database")
    );
    assert_eq!(config.history_db_path(), data_dir.join("history.db"));
    assert_eq!(config.core.history_retention_days, 30);
}

#[test]
fn test_investigation_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let investigations = r#"
[[investigations]]
name = "minimal"
task = "loop"
system_prompt = "s"
initial_observation = "o"
"#;

    let config = Config::from_toml_str(&config_toml(dir.path(), investigations)).unwrap();
    let minimal = config.investigation("minimal").unwrap();

    assert_eq!(minimal.budget, 10);
    assert_eq!(minimal.repeat_policy, RepeatPolicy::RefuseAndReprompt);
    assert!(minimal.tools.is_empty());
    assert!(minimal.context_token_limit.is_none());
}

#[test]
fn test_zero_budget_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let investigations = BARBARA.replace("budget = 15", "budget = 0");

    let err = Config::from_toml_str(&config_toml(dir.path(), &investigations)).unwrap_err();
    assert!(err.to_string().contains("budget"));
}

#[test]
fn test_unknown_tool_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let investigations = BARBARA.replace("\"query-places\"", "\"query-weather\"");

    let err = Config::from_toml_str(&config_toml(dir.path(), &investigations)).unwrap_err();
    assert!(err.to_string().contains("query-weather"));
}

#[test]
fn test_tool_without_endpoint_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let investigations = BARBARA.replace("\"query-places\"", "\"query-gps\"");

    let err = Config::from_toml_str(&config_toml(dir.path(), &investigations)).unwrap_err();
    assert!(err.to_string().contains("no endpoint"));
}

#[test]
fn test_duplicate_investigation_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let investigations = format!("{}{}", BARBARA, BARBARA);

    let err = Config::from_toml_str(&config_toml(dir.path(), &investigations)).unwrap_err();
    assert!(err.to_string().contains("Duplicate"));
}

#[test]
fn test_invalid_provider_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let toml = config_toml(dir.path(), BARBARA).replace(
        "default_provider = \"ollama\"",
        "default_provider = \"gemini\"",
    );

    let err = Config::from_toml_str(&toml).unwrap_err();
    assert!(err.to_string().contains("gemini"));
}

#[test]
fn test_unknown_investigation_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_toml_str(&config_toml(dir.path(), BARBARA)).unwrap();

    assert!(config.investigation("datacenters").is_err());
}

#[test]
fn test_default_config_round_trips_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default_config();
    config.core.data_dir = dir.path().join("data");

    let toml = toml::to_string_pretty(&config).unwrap();
    let parsed = Config::from_toml_str(&toml).unwrap();

    assert_eq!(parsed.investigations.len(), config.investigations.len());
    assert!(parsed.investigation("datacenters").is_ok());
    assert!(parsed.investigation("barbara").is_ok());
}

//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Run a configured investigation
//! - report: Submit an answer directly
//! - list: Show configured investigations
//! - history / replay: Inspect recorded runs
//! - doctor: Validate configuration, secrets and providers
//! - secret: Manage keychain entries

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::io::{self, BufRead};
use std::sync::Arc;

use crate::agent::{
    answer_payload, ActionKind, Investigation, InvestigationLoop, LoopState, SubmissionStatus,
};
use crate::config::{Config, InvestigationConfig};
use crate::history::{RunHistory, RunRecord};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::LLMProvider;
use crate::report::{HttpReporter, Reporter};
use crate::secrets::{SecretCache, SecretManager, SecretString};
use crate::tools::{CentralaQueryTool, ToolDispatcher};

/// Keychain service name for all Sleuth secrets
pub const SECRET_SERVICE: &str = "sleuth";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the LLM router from configuration
///
/// Cloud providers are registered only when their API key is available, so a
/// missing key never fails a run that another provider can serve. Ollama is
/// registered when enabled or when it is the default provider.
pub fn build_router(config: &Config, secret_manager: &SecretManager, secret_cache: &Arc<SecretCache>) -> Result<LLMRouter> {
    let mut providers: Vec<Box<dyn LLMProvider>> = Vec::new();

    if secret_manager.has_secret("anthropic_api_key") {
        providers.push(Box::new(AnthropicProvider::new(
            config.llm.anthropic.clone(),
            Arc::clone(secret_cache),
        )));
    }

    if secret_manager.has_secret("openai_api_key") {
        providers.push(Box::new(OpenAIProvider::new(
            config.llm.openai.clone(),
            Arc::clone(secret_cache),
        )));
    }

    if config.llm.ollama.enabled || config.llm.default_provider == "ollama" {
        providers.push(Box::new(OllamaProvider::from_config(&config.llm.ollama)));
    }

    if providers.is_empty() {
        return Err(anyhow::anyhow!(
            "No LLM providers configured. Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or enable [llm.ollama]"
        ));
    }

    Ok(LLMRouter::new(providers, Arc::new(config.llm.clone())))
}

/// Build the dispatcher holding only the tools an investigation may use
pub fn build_dispatcher(
    config: &Config,
    investigation: &InvestigationConfig,
    api_key: &SecretString,
) -> Result<ToolDispatcher> {
    let mut dispatcher = ToolDispatcher::new();

    for kind in investigation.tool_kinds() {
        let endpoint = config
            .tools
            .endpoint_for(&kind)
            .ok_or_else(|| sdk::EngineError::ToolNotConfigured(kind.to_string()))?;
        dispatcher.register(
            kind.clone(),
            Arc::new(CentralaQueryTool::new(kind.as_str(), endpoint, api_key.clone())),
        );
    }

    Ok(dispatcher)
}

/// Run a configured investigation
pub async fn handle_run(
    name: String,
    budget: Option<u32>,
    no_submit: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let investigation_config = config.investigation(&name)?;
    let mut investigation = Investigation::from(investigation_config);
    if let Some(budget) = budget {
        investigation.budget = budget;
    }

    let secret_manager = Arc::new(SecretManager::new(SECRET_SERVICE));
    let secret_cache = Arc::new(SecretCache::new(Arc::clone(&secret_manager)));

    let api_key = secret_cache
        .get_secret(&config.report.api_key_secret)
        .with_context(|| {
            format!(
                "API key '{}' is required for query tools and submission",
                config.report.api_key_secret
            )
        })?;

    let router = build_router(config, &secret_manager, &secret_cache)?;
    let dispatcher = build_dispatcher(config, investigation_config, &api_key)?;
    let reporter: Option<Arc<dyn Reporter>> = if no_submit {
        None
    } else {
        Some(Arc::new(HttpReporter::from_config(&config.report, api_key)))
    };

    let driver = InvestigationLoop::new(Arc::new(router), Arc::new(dispatcher), reporter);

    if let OutputFormat::Text = format {
        println!(
            "Running investigation '{}' (budget {}, {})",
            investigation.name, investigation.budget, investigation.repeat_policy
        );
        println!();
    }

    let result = driver.run(&investigation).await;
    let record = RunRecord::from_result(&result, Utc::now());

    if let Err(e) = record_run(&record, config).await {
        tracing::warn!("Failed to save run {}: {:#}", record.run_id, e);
    }

    match format {
        OutputFormat::Text => print_record_summary(&record),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }

    if record.state == LoopState::DoneError {
        return Err(anyhow::anyhow!(
            "Run {} ended in {}: {}",
            record.run_id,
            record.state,
            record.error.as_deref().unwrap_or("unknown error")
        ));
    }
    if let SubmissionStatus::Failed { error } = &record.submission {
        return Err(anyhow::anyhow!("Answer submission failed: {}", error));
    }

    Ok(())
}

fn print_record_summary(record: &RunRecord) {
    println!("Run {}: {}", record.run_id, record.state);
    if let Some(answer) = &record.answer {
        println!("  Answer: {}", answer);
    }
    if let Some(error) = &record.error {
        println!("  Error: {}", error);
    }
    println!(
        "  Budget: {} of {} used",
        record.budget_consumed, record.budget_initial
    );
    println!(
        "  Iterations: {}, dispatches: {}, repeats flagged: {}",
        record.iterations, record.dispatches, record.repeats_flagged
    );
    if let Some(provider) = &record.provider_used {
        println!("  Provider: {}", provider);
    }
    println!("  Duration: {}ms", record.duration_ms);
    match &record.submission {
        SubmissionStatus::NotAttempted => println!("  Submission: not attempted"),
        SubmissionStatus::Skipped => println!("  Submission: skipped (--no-submit)"),
        SubmissionStatus::Accepted { ack } => println!(
            "  Submission: accepted ({}){}",
            ack.status,
            ack.message().map(|m| format!(" {}", m)).unwrap_or_default()
        ),
        SubmissionStatus::Failed { error } => println!("  Submission: failed: {}", error),
    }
}

/// Submit an answer without running an investigation
pub async fn handle_report(
    task: String,
    answer: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let secret_manager = Arc::new(SecretManager::new(SECRET_SERVICE));
    let api_key = SecretCache::new(secret_manager)
        .get_secret(&config.report.api_key_secret)
        .context("API key is required for submission")?;

    let reporter = HttpReporter::from_config(&config.report, api_key);
    let ack = reporter
        .submit(&task, &answer_payload(&answer))
        .await
        .context("Answer submission failed")?;

    match format {
        OutputFormat::Text => {
            println!("✓ Answer for '{}' accepted ({})", task, ack.status);
            if let Some(message) = ack.message() {
                println!("  {}", message);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "task": task,
                "status": ack.status,
                "body": ack.body,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List configured investigations
pub fn handle_list(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if config.investigations.is_empty() {
                println!("No investigations configured");
                return Ok(());
            }
            for investigation in &config.investigations {
                let tools: Vec<String> = investigation
                    .tool_kinds()
                    .iter()
                    .map(ActionKind::to_string)
                    .collect();
                println!("{}", investigation.name);
                println!("  Task: {}", investigation.task);
                println!("  Budget: {}", investigation.budget);
                println!("  Repeats: {}", investigation.repeat_policy);
                println!("  Tools: {}", tools.join(", "));
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "investigations": config.investigations,
                "count": config.investigations.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Save a finished run and prune runs past the retention window
async fn record_run(record: &RunRecord, config: &Config) -> Result<()> {
    let history = RunHistory::open(&config.history_db_path()).await?;
    history.save(record).await?;

    let pruned = history
        .delete_older_than(config.core.history_retention_days)
        .await?;
    if pruned > 0 {
        tracing::info!(
            "Pruned {} runs older than {} days",
            pruned,
            config.core.history_retention_days
        );
    }

    history.close().await
}

/// Show recent runs
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let history = RunHistory::open(&config.history_db_path()).await?;
    let runs = history
        .list(limit)
        .await
        .context("Failed to read run history")?;

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs in history");
                return Ok(());
            }

            println!("Run History (last {} runs):", limit);
            println!();

            for run in runs {
                println!("Run ID: {}", run.run_id);
                println!("  Investigation: {}", run.investigation);
                println!("  State: {}", run.state);
                if let Some(answer) = &run.answer {
                    println!("  Answer: {}", answer);
                }
                println!(
                    "  Budget: {} of {} used",
                    run.budget_consumed, run.budget_initial
                );
                println!(
                    "  Finished: {}",
                    run.finished_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!();
            }
        }
        OutputFormat::Json => {
            let summaries: Vec<_> = runs
                .iter()
                .map(|run| {
                    json!({
                        "run_id": run.run_id,
                        "investigation": run.investigation,
                        "state": run.state,
                        "answer": run.answer,
                        "budget_consumed": run.budget_consumed,
                        "budget_initial": run.budget_initial,
                        "finished_at": run.finished_at,
                    })
                })
                .collect();
            let output = json!({
                "runs": summaries,
                "count": summaries.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the full transcript of a run
pub async fn handle_replay(run_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let record = RunHistory::open(&config.history_db_path())
        .await?
        .load(&run_id)
        .await?;

    match format {
        OutputFormat::Text => {
            print_record_summary(&record);
            println!();
            println!("Transcript ({} turns):", record.transcript.len());
            println!();
            for (i, turn) in record.transcript.iter().enumerate() {
                println!("[{}] {}", i, turn.role);
                for line in turn.content.lines() {
                    println!("  {}", line);
                }
                println!();
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }

    Ok(())
}

/// Validate configuration and check secrets and providers
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".to_string(), "Valid".to_string()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".to_string(), "Exists".to_string()));
    } else {
        checks.push(("Data directory".to_string(), "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    let secret_manager = Arc::new(SecretManager::new(SECRET_SERVICE));
    let secret_cache = Arc::new(SecretCache::new(Arc::clone(&secret_manager)));

    for key in [
        config.report.api_key_secret.as_str(),
        "anthropic_api_key",
        "openai_api_key",
    ] {
        let status = if secret_manager.has_secret(key) {
            "Configured"
        } else {
            "Not configured"
        };
        checks.push((key.to_string(), status.to_string()));
    }
    if !secret_manager.has_secret(&config.report.api_key_secret) {
        issues.push(format!(
            "Secret '{}' is missing. Run 'sleuth secret set {}' or export {}",
            config.report.api_key_secret,
            config.report.api_key_secret,
            SecretManager::env_var_name(&config.report.api_key_secret)
        ));
    }

    match build_router(config, &secret_manager, &secret_cache) {
        Ok(router) => {
            for health in router.check_health().await {
                let status = if health.healthy { "Available" } else { "Not available" };
                let locality = if health.local { "local" } else { "cloud" };
                checks.push((
                    format!("Provider {} ({})", health.name, locality),
                    status.to_string(),
                ));
                if !health.healthy {
                    issues.push(format!("LLM provider '{}' is not reachable", health.name));
                }
            }
        }
        Err(e) => {
            checks.push(("LLM providers".to_string(), "None".to_string()));
            issues.push(e.to_string());
        }
    }

    checks.push((
        "Investigations".to_string(),
        config.investigations.len().to_string(),
    ));

    match format {
        OutputFormat::Text => {
            println!("Sleuth Diagnostics");
            println!("==================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Store a secret read from stdin
pub fn handle_secret_set(key: String) -> Result<()> {
    eprint!("Enter value for '{}': ", key);
    let mut value = String::new();
    io::stdin()
        .lock()
        .read_line(&mut value)
        .context("Failed to read secret from stdin")?;

    SecretManager::new(SECRET_SERVICE).set_secret(&key, value.trim())?;
    println!("✓ Stored '{}' in the keychain", key);
    Ok(())
}

/// Delete a secret from the keychain
pub fn handle_secret_delete(key: String) -> Result<()> {
    SecretManager::new(SECRET_SERVICE).delete_secret(&key)?;
    println!("✓ Deleted '{}' from the keychain", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_holds_only_investigation_tools() {
        let config = Config::default_config();
        let barbara = config.investigation("barbara").unwrap();

        let dispatcher = build_dispatcher(&config, barbara, &SecretString::from("key")).unwrap();

        assert!(dispatcher.supports(&ActionKind::QueryPeople));
        assert!(dispatcher.supports(&ActionKind::QueryPlaces));
        assert!(!dispatcher.supports(&ActionKind::QueryDb));
    }

    #[test]
    fn test_router_with_ollama_default_needs_no_keys() {
        let mut config = Config::default_config();
        config.llm.default_provider = "ollama".to_string();
        let manager = SecretManager::new("sleuth-test-no-keys");
        let cache = Arc::new(SecretCache::new(Arc::new(SecretManager::new(
            "sleuth-test-no-keys",
        ))));

        let router = build_router(&config, &manager, &cache).unwrap();
        assert!(router.provider_count() >= 1);
    }
}

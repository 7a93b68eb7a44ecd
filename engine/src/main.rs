// Sleuth investigation engine
// Main entry point for the sleuth binary

use clap::Parser;
use sdk::{EngineError, SleuthErrorExt};
use sleuth_engine::cli::{Cli, Command, SecretAction};
use sleuth_engine::config::Config;
use sleuth_engine::handlers::{
    handle_doctor, handle_history, handle_list, handle_replay, handle_report, handle_run,
    handle_secret_delete, handle_secret_set, OutputFormat,
};
use sleuth_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let result = run().await;

    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
    }

    result
}

async fn run() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over config; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Sleuth v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Run {
            name,
            budget,
            no_submit,
        } => {
            tracing::info!("Running investigation: {}", name);
            handle_run(name, budget, no_submit, &config, format).await
        }

        Command::Report { task, answer } => {
            tracing::info!("Submitting answer for task: {}", task);
            handle_report(task, answer, &config, format).await
        }

        Command::List => handle_list(&config, format),

        Command::History { limit } => {
            tracing::info!("Showing history (limit: {})", limit);
            handle_history(limit, &config, format).await
        }

        Command::Replay { run_id } => {
            tracing::info!("Replaying run: {}", run_id);
            handle_replay(run_id, &config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }

        Command::Secret { action } => match action {
            SecretAction::Set { key } => handle_secret_set(key),
            SecretAction::Delete { key } => handle_secret_delete(key),
        },
    }
}

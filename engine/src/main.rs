// OnGoal goal-tracking chat server
// Main entry point for the ongoal binary

use clap::Parser;
use ongoal_engine::cli::{Cli, Command};
use ongoal_engine::config::Config;
use ongoal_engine::handlers::{handle_chat, handle_serve, handle_status, OutputFormat};
use ongoal_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over core.log_level; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("OnGoal v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Serve { host, port } => {
            tracing::info!("Starting server...");
            handle_serve(&config, host, port).await
        }

        Command::Chat {
            conversation,
            offline,
        } => {
            tracing::info!("Starting chat in conversation '{}'", conversation);
            handle_chat(&config, &conversation, offline, format).await
        }

        Command::Status => {
            tracing::info!("Checking provider status...");
            handle_status(&config, format).await
        }
    }
}

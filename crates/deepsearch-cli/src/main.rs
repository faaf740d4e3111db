//! Deepsearch CLI
//!
//! Ask questions on the command line, answered from live web search
//! with staged LLM synthesis.

use anyhow::Result;
use clap::Parser;
use deepsearch_core::error::exit_codes;
use deepsearch_core::{Config, DeepSearchError};
use std::path::PathBuf;

mod app;
mod commands;
mod output;
mod progress;

use app::{Cli, Commands};

/// Where quota counters persist between invocations. `DEEPSEARCH_STATE`
/// overrides the per-user default.
pub(crate) fn state_path() -> PathBuf {
    std::env::var("DEEPSEARCH_STATE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| deepsearch_core::registry::default_registry_path())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Ask(args) => commands::ask::run(args, config, cli.format, cli.verbose).await,
        Commands::Cache(args) => commands::cache::run(args, &config, cli.format).await,
        Commands::Providers(args) => commands::providers::run(args, config, cli.format).await,
        Commands::Config(args) => commands::config::run(args, &config, cli.format).await,
    };

    if let Err(error) = result {
        eprintln!("Error: {error:#}");
        let code = error
            .downcast_ref::<DeepSearchError>()
            .map(DeepSearchError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
    Ok(())
}

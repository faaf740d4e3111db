//! Provider commands

use crate::app::{OutputFormat, ProvidersAction, ProvidersArgs};
use anyhow::Result;
use deepsearch_core::{Config, DeepSearchEngine, ProviderKind};
use tracing::debug;

pub async fn run(args: ProvidersArgs, config: Config, format: OutputFormat) -> Result<()> {
    let engine = DeepSearchEngine::new(config)?;
    let state = crate::state_path();
    if let Err(e) = engine.registry().load(&state) {
        debug!("provider state not restored: {e}");
    }

    match args.action {
        ProvidersAction::List => {
            let snapshot = engine.registry().snapshot();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                _ => {
                    // The built-in embedder is always registered; only
                    // search and llm entries come from configuration
                    let configured = snapshot
                        .iter()
                        .any(|e| matches!(e.kind, ProviderKind::Search | ProviderKind::Llm));
                    if !configured {
                        println!("No providers configured");
                        return Ok(());
                    }
                    println!(
                        "{:<16} {:<7} {:<24} {:>10}  {}",
                        "ID", "KIND", "MODEL", "USED", "FLAGS"
                    );
                    for entry in &snapshot {
                        let used = match entry.daily_quota {
                            Some(limit) => format!("{}/{}", entry.used_today, limit),
                            None => entry.used_today.to_string(),
                        };
                        let mut flags = Vec::new();
                        if !entry.healthy {
                            flags.push("unhealthy");
                        }
                        if entry.exhausted {
                            flags.push("exhausted");
                        }
                        println!(
                            "{:<16} {:<7} {:<24} {:>10}  {}",
                            entry.id,
                            entry.kind.as_str(),
                            entry.model.as_deref().unwrap_or("-"),
                            used,
                            flags.join(",")
                        );
                    }
                }
            }
        }
        ProvidersAction::Reset => {
            engine.registry().reset();
            engine.registry().save(&state)?;
            println!("Provider counters reset");
        }
    }
    Ok(())
}

//! Config commands

use crate::app::{ConfigAction, ConfigArgs, OutputFormat};
use anyhow::{bail, Result};
use deepsearch_core::Config;
use std::path::PathBuf;

/// Same resolution order as [`Config::load`]
fn config_path() -> PathBuf {
    std::env::var("DEEPSEARCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| Config::default_path())
}

pub async fn run(args: ConfigArgs, config: &Config, format: OutputFormat) -> Result<()> {
    match args.action {
        ConfigAction::Show => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            _ => print!("{}", serde_yaml::to_string(config)?),
        },
        ConfigAction::Path => println!("{}", config_path().display()),
        ConfigAction::Init => {
            let path = config_path();
            if path.exists() {
                bail!("config already exists at {}", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, serde_yaml::to_string(&Config::default())?)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

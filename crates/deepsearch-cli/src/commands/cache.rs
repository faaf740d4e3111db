//! Cache commands

use crate::app::{CacheAction, CacheArgs, OutputFormat};
use anyhow::Result;
use deepsearch_core::{CacheStore, Config};

pub async fn run(args: CacheArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let store = CacheStore::from_config(&config.cache);

    match args.action {
        CacheAction::Stats { user } => {
            let stats = store.stats(user.as_deref());
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                _ => {
                    println!("Entries:     {}", stats.total_entries);
                    println!("  Active:    {}", stats.active_entries);
                    println!("  Expired:   {}", stats.expired_entries);
                    println!("Disk usage:  {}", format_bytes(stats.total_bytes));
                }
            }
        }
        CacheAction::Clear { user } => {
            let removed = store.clear(user.as_deref())?;
            match user {
                Some(user) => println!("Removed {removed} cached answers for {user}"),
                None => println!("Removed {removed} cached answers"),
            }
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

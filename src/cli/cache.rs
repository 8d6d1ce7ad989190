use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use soulpilot::{CacheAdmin, Config, EntrySummary};
use soulpilot_cache_store::FsCacheStorage;

use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// List stored agent runs, newest first
    List,

    /// Print one stored run
    Show {
        /// Entry fingerprint
        fingerprint: String,
    },

    /// Remove one stored run
    Evict {
        /// Entry fingerprint
        fingerprint: String,
    },

    /// Remove runs older than a given age
    Prune {
        /// Maximum age to keep, e.g. "7d" or "12h"
        #[arg(long, value_parser = humantime::parse_duration)]
        older_than: Duration,
    },
}

pub async fn cmd_cache(args: CacheArgs, config: &Config, output: OutputFormat) -> Result<()> {
    let storage = FsCacheStorage::new(config.storage_policy());
    info!(root = %storage.root().display(), "using agent cache");
    let admin = CacheAdmin::new(storage);

    match args.action {
        CacheAction::List => {
            let entries = admin.list().await.context("Failed to list cache entries")?;
            print_entries(&entries, output)?;
        }
        CacheAction::Show { fingerprint } => {
            let Some(entry) = admin
                .show(&fingerprint)
                .await
                .context("Failed to read cache entry")?
            else {
                bail!("no readable cache entry for {fingerprint}");
            };
            match output {
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&entry)?),
                _ => println!("{}", serde_json::to_string_pretty(&entry)?),
            }
        }
        CacheAction::Evict { fingerprint } => {
            if admin.evict(&fingerprint).await.context("Failed to evict")? {
                println!("Evicted {fingerprint}");
            } else {
                println!("No entry for {fingerprint}");
            }
        }
        CacheAction::Prune { older_than } => {
            let max_age =
                chrono::Duration::from_std(older_than).context("Prune age is out of range")?;
            let removed = admin.prune(max_age).await.context("Failed to prune cache")?;
            println!("Removed {removed} entr{}", if removed == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

fn print_entries(entries: &[EntrySummary], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(entries)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(entries)?),
        OutputFormat::Human => {
            if entries.is_empty() {
                println!("Cache is empty");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {}  {:>8}B  {:>3} steps  {}",
                    short(&entry.fingerprint),
                    entry.stored_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.bytes,
                    entry
                        .steps
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    entry.instruction.as_deref().unwrap_or("<unreadable>"),
                );
            }
        }
    }
    Ok(())
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use soulpilot::telemetry::init_logging;
use soulpilot::{Config, LoadedConfig};

use super::cache::cmd_cache;
use super::commands::Commands;
use super::config::cmd_config;
use super::env::CliArgs;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let LoadedConfig {
        mut config,
        path,
        from_file,
    } = Config::load(cli.config.as_deref()).await?;
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    init_logging(&config.logging, cli.debug)?;
    debug!(version = env!("CARGO_PKG_VERSION"), config = %path.display(), "soulpilot starting");

    let outcome = match cli.command {
        Commands::Cache(args) => cmd_cache(args, &config, cli.output).await,
        Commands::Config(args) => cmd_config(args, &config, &path, from_file, cli.output),
    };
    if let Err(err) = &outcome {
        error!("Command failed: {err:#}");
    }
    outcome
}

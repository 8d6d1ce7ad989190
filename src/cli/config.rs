use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use soulpilot::Config;

use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets redacted
    Show,

    /// Print where configuration was read from
    Path,
}

pub fn cmd_config(
    args: ConfigArgs,
    config: &Config,
    path: &Path,
    from_file: bool,
    output: OutputFormat,
) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let redacted = config.redacted();
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&redacted)?),
                _ => print!("{}", serde_yaml::to_string(&redacted)?),
            }
        }
        ConfigAction::Path => {
            let suffix = if from_file { "" } else { " (not found, defaults in use)" };
            println!("{}{suffix}", path.display());
        }
    }
    Ok(())
}

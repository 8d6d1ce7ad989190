use clap::Subcommand;

use super::cache::CacheArgs;
use super::config::ConfigArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Inspect and maintain the agent replay cache
    Cache(CacheArgs),

    /// Show the resolved configuration
    Config(ConfigArgs),
}

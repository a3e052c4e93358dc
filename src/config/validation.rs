use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;
use std::path::{Path, PathBuf};

use super::LogLocalConfig;
use crate::error::LogLocalError;

#[derive(Parser, Clone, Debug)]
#[command(name = "loglocal", about = "Resolve a loglocal configuration and run an instrumented sample")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, env = "LOGLOCAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the log level
    #[arg(long)]
    pub level: Option<String>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Build the configuration figment: defaults, then the optional TOML file,
/// then `LOGLOCAL_`-prefixed environment variables (`__` separates nesting).
pub fn config_figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(LogLocalConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("LOGLOCAL_").split("__"))
}

/// Load and validate configuration
pub fn load_config(path: Option<&Path>) -> Result<LogLocalConfig, LogLocalError> {
    let config: LogLocalConfig = config_figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration honouring the CLI overrides
pub fn load_config_with_cli(cli: &Cli) -> Result<LogLocalConfig, LogLocalError> {
    let mut figment = config_figment(cli.config.as_deref());
    if let Some(level) = &cli.level {
        figment = figment.merge(Serialized::default("log_config.level", level));
    }
    let config: LogLocalConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

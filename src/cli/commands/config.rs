//! Implementation of the `orchestra config` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Load and validate the configuration
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_else(|e| format!("<unprintable: {e}>"))
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub min_concurrent: usize,
    pub max_concurrent: usize,
    pub persistence: bool,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid\n  Concurrency: {}..={}\n  Persistence: {}",
            self.min_concurrent,
            self.max_concurrent,
            if self.persistence { "sqlite" } else { "in-memory" }
        )
    }
}

/// `config` is already loaded and validated by the caller; a load failure
/// surfaces as the command error.
pub fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => output(&ConfigShowOutput { config }, json_mode),
        ConfigCommand::Validate => output(
            &ConfigValidateOutput {
                valid: true,
                min_concurrent: config.allocator.min_concurrent,
                max_concurrent: config.allocator.max_concurrent,
                persistence: config.database.enabled,
            },
            json_mode,
        ),
    }
    Ok(())
}

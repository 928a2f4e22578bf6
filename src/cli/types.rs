//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(about = "Orchestra - adaptive task orchestration core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .orchestra/
    #[arg(short, long, global = true, env = "ORCHESTRA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler with host metrics until Ctrl-C
    Run(RunArgs),

    /// Run synthetic tasks and a demo arena match in-process
    Simulate(SimulateArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `inspect`: Rebuild task trees from a snapshot file and print them
//! - `reincarnate`: Show what a restart with the given active definitions would do
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Inspect(InspectConfig),
    Reincarnate(ReincarnateConfig),
    ShowConfig,
}

impl ExecutionMode {
    pub fn verbose(&self) -> bool {
        match self {
            ExecutionMode::Inspect(config) => config.verbose,
            ExecutionMode::Reincarnate(config) => config.verbose,
            ExecutionMode::ShowConfig => false,
        }
    }
}

#[derive(Debug)]
pub struct InspectConfig {
    pub snapshot: PathBuf,
    pub json: bool,
    pub verbose: bool,
}

#[derive(Debug)]
pub struct ReincarnateConfig {
    pub snapshot: PathBuf,
    pub active_defs: Vec<String>,
    pub config_override: Option<PathBuf>,
    /// `Some(true)` forces attempt reversal on, `None` defers to configuration
    pub revert_attempts: Option<bool>,
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "tasklife")]
#[command(author = "Task Lifecycle Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and reincarnate persisted task lifecycle snapshots")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the task trees stored in a snapshot file
    Inspect {
        /// Snapshot file (one task object or an array of them)
        snapshot: PathBuf,
        /// Print the re-serialized snapshot instead of a tree
        #[arg(long = "json")]
        json: bool,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Reincarnate snapshot tasks against a set of active definitions
    Reincarnate {
        /// Snapshot file (one task object or an array of them)
        snapshot: PathBuf,
        /// Root task names that are still defined
        #[arg(long = "defs", value_name = "NAME", num_args = 1..)]
        defs: Vec<String>,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Restart attempt counters at zero
        #[arg(long = "revert-attempts")]
        revert_attempts: bool,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Inspect {
                snapshot,
                json,
                verbose,
            }) => Ok(ExecutionMode::Inspect(InspectConfig {
                snapshot: snapshot.clone(),
                json: *json,
                verbose: *verbose,
            })),
            Some(Commands::Reincarnate {
                snapshot,
                defs,
                config,
                revert_attempts,
                verbose,
            }) => {
                let active_defs: Vec<String> = defs
                    .iter()
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                if active_defs.len() != defs.len() {
                    return Err("Active definition names must not be blank".to_string());
                }

                Ok(ExecutionMode::Reincarnate(ReincarnateConfig {
                    snapshot: snapshot.clone(),
                    active_defs,
                    config_override: config.clone(),
                    revert_attempts: revert_attempts.then_some(true),
                    verbose: *verbose,
                }))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'tasklife --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

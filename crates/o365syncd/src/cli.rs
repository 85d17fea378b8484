//! CLI argument parsing using clap derive

use clap::{Parser, Subcommand};
use o365sync_core::state::DEFAULT_DOCUMENT_PATH;
use std::path::PathBuf;

/// Office 365 endpoint sync - keeps URL categories and lookup tables current
#[derive(Parser, Debug)]
#[command(name = "o365syncd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration and state document
    #[arg(long, global = true, env = "O365SYNC_STATE_FILE", default_value = DEFAULT_DOCUMENT_PATH)]
    pub state_file: PathBuf,

    /// The command to run (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run one reconciliation
    Run {
        /// Rebuild even if nothing changed, with a single fetch attempt
        #[arg(long)]
        force: bool,
    },

    /// Print the recorded run state as JSON
    Status,

    /// Print the running configuration as JSON
    Config,

    /// Write the configuration document and print the schedule entry
    ///
    /// Examples:
    ///   o365syncd install
    ///   o365syncd install --config '{"service_areas": {"exchange": true}}'
    ///   o365syncd install --config-file /shared/o365/config.json --force
    Install {
        /// Configuration as inline JSON
        #[arg(long, conflicts_with = "config_file")]
        config: Option<String>,

        /// Configuration JSON file
        #[arg(long)]
        config_file: Option<PathBuf>,

        /// Run a forced reconciliation right after installing
        #[arg(long)]
        force: bool,
    },

    /// Remove the configuration document
    Uninstall {
        /// Also delete every managed policy object
        #[arg(long)]
        full: bool,
    },
}

impl Cli {
    /// The command to execute, `run` when none was given
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Run { force: false })
    }
}

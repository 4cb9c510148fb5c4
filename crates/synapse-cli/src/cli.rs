//! CLI argument definitions for Synapse.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Synapse -- reactive state-change batching and email triggers.
#[derive(Parser)]
#[command(
    name = "synapse",
    version,
    about = "Synapse -- reactive state-change batching and email triggers",
    long_about = "Debounces bursts of state changes into single workflow runs and fires \
                  workflows when incoming email matches a registered trigger."
)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the poll loop and read state changes from stdin, one JSON
    /// object per line.  Also accepts `flush [key]`, `stats`, `triggers`
    /// and `quit`.
    Run {
        /// Log workflow invocations instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single email poll pass and print the fired trigger ids.
    Check {
        /// Log workflow invocations instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the effective configuration and declared triggers.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_global_flag() {
        let cli = Cli::try_parse_from(["synapse", "status"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));

        let cli = Cli::try_parse_from(["synapse", "check", "--dry-run", "-c", "other.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Commands::Check { dry_run: true }));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["synapse", "serve"]).is_err());
    }
}

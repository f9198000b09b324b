//! CLI argument definitions using clap
//!
//! Commands:
//! - tsconsensus init --config <path> [--data-dir <dir>]
//! - tsconsensus demo --config <path> [--writes <n>] [--group <id>]
//! - tsconsensus inspect --config <path>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tsconsensus - recovery-aware linearizable reads for consensus groups
#[derive(Parser, Debug)]
#[command(name = "tsconsensus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file and create the data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./tsconsensus.json")]
        config: PathBuf,

        /// Data directory recorded in the new configuration
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Write to a counter group, restart it and read through the gateway
    Demo {
        /// Path to configuration file
        #[arg(long, default_value = "./tsconsensus.json")]
        config: PathBuf,

        /// Number of increments to write before restarting
        #[arg(long, default_value_t = 10)]
        writes: u64,

        /// Consensus group id
        #[arg(long, default_value_t = 1)]
        group: u32,
    },

    /// List persisted groups with their log tail and snapshot index
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./tsconsensus.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

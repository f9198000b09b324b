//! CLI module for tsconsensus
//!
//! Provides command-line interface for:
//! - init: write a default configuration
//! - demo: write, restart and read a counter group through the gateway
//! - inspect: list persisted groups

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command, LogFormat};
pub use commands::{
    demo, demo_report, init, init_logging, inspect, inspect_report, run, run_command, DemoReport,
    GroupReport,
};
pub use errors::{CliError, CliErrorCode, CliResult};

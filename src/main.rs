//! tsconsensus CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`, printing errors to
//! stderr and exiting non-zero on failure. Subsystem setup, logging
//! included, belongs to the CLI module.

use tsconsensus::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

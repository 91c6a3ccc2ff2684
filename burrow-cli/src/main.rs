//! Burrow container launcher CLI
//!
//! Launches a command in fresh PID, mount, UTS and network namespaces,
//! connected to the host through a veth pair.

use clap::Parser;
use std::io::{self, IsTerminal};
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity; RUST_LOG wins when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so a container's stdout file only holds its output;
    // no color codes when stderr is a file
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .init();

    // Execute the command
    if let Err(e) = commands::dispatch(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

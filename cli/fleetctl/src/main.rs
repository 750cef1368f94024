//! fleetctl - CLI for the fleetplan reconciliation pipeline
//!
//! Loads a demand plan produced by the upstream optimizer, reconciles it
//! against a catalog, and writes the replayable action trace.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

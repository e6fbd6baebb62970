//! Command-line interface for the venue synchronisation engine.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;

pub use error::CliError;

use config::{StatusArgs, SyncArgs};

/// Run the venue sync CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &mut stdout)
}

fn dispatch(command: Command, writer: &mut dyn std::io::Write) -> Result<(), CliError> {
    match command {
        Command::Run(args) => commands::run_scheduled(&args.into_config()?),
        Command::Sync(args) => commands::sync_once(&args.into_config()?, writer),
        Command::Status(args) => commands::status(&args.into_data_dir()?, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "venue-sync",
    about = "Keep a cache of bitcoin-accepting venues in step with OpenStreetMap",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bootstrap if designated, then synchronise on a timer until interrupted.
    Run(SyncArgs),
    /// Run one incremental pass, or a full catch-up with `--bootstrap`.
    Sync(SyncArgs),
    /// Report the consumed sequence, cache size, and last applied sequence.
    Status(StatusArgs),
}

#[cfg(test)]
mod tests;

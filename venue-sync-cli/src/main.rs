//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use venue_sync_cli::CliError;

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match venue_sync_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("venue-sync: {err}");
            std::process::exit(1);
        }
    }
}

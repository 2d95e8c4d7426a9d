//! wikibridge server binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod adapters;
mod cli;
mod logging;
mod server;
mod tools;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Clean old logs (best-effort, before tracing is initialized).
    let log_dir = cli.log_dir();
    if let Some(dir) = &log_dir {
        logging::cleanup_old_logs(dir);
    }

    // Initialize tracing with optional file layer.
    let _guard = logging::init_tracing(log_dir.as_deref())?;

    cli.run().await
}

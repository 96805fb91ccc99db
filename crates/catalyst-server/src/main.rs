//! Catalyst backup CLI
//!
//! Serves the backup routes or runs a single backup/restore against the
//! configured stores.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, cli.config.as_deref()).await,
        Commands::Create(args) => commands::create::run(args, cli.config.as_deref()).await,
        Commands::Restore(args) => commands::restore::run(args, cli.config.as_deref()).await,
    }
}

/// Initialize tracing with appropriate verbosity; `RUST_LOG` wins when set
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("info"),
                1 => EnvFilter::new("debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

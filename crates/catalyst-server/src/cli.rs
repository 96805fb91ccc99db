//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::commands::create::CreateArgs;
use crate::commands::restore::RestoreArgs;
use crate::commands::serve::ServeArgs;

/// Catalyst backup - full-system backup and restore for Catalyst
#[derive(Parser, Debug)]
#[command(name = "catalyst-backup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to catalyst.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the backup HTTP routes
    Serve(ServeArgs),

    /// Write a backup archive to a file
    Create(CreateArgs),

    /// Restore both stores from a backup archive
    Restore(RestoreArgs),
}

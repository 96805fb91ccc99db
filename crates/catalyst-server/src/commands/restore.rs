//! Restore command
//!
//! Replaces the content of the configured stores with a local backup archive.

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use catalyst_backup::RestoreManager;
use catalyst_server::{AppState, Config};
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Archive file to restore from
    #[arg(short, long)]
    pub input: Utf8PathBuf,

    /// Confirm that every collection will be truncated
    #[arg(long)]
    pub yes: bool,

    /// Print the restore report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RestoreArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    if !args.input.exists() {
        bail!("Backup file not found: {}", args.input);
    }
    if !args.yes {
        output::warning("Restore truncates every collection and overwrites stored objects");
        bail!("Refusing to restore without --yes");
    }

    let config = Config::load(config_path)?;
    let state = AppState::from_config(&config).await?;

    let archive = std::fs::File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input))?;
    let report = RestoreManager::new(state.documents.as_ref(), state.objects.as_ref())
        .with_batch_size(state.restore_batch_size)
        .restore(archive)
        .await
        .context("Restore failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::header("Restore complete");
    output::kv("Collections", &report.collections.to_string());
    output::kv("Documents", &report.documents.to_string());
    output::kv("Objects", &report.objects.to_string());
    output::kv("Buckets created", &report.buckets_created.to_string());
    output::kv("Source encryption", &report.source_encryption);
    output::success(&format!("Restored from {}", args.input));
    Ok(())
}

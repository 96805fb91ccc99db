//! Create command
//!
//! Writes a backup of the configured stores to a local file.

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use catalyst_backup::BackupManager;
use catalyst_server::{AppState, Config};
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Archive file to write
    #[arg(short, long, default_value = "backup.zip")]
    pub output: Utf8PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,

    /// Print the backup report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: CreateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.output);
    }

    let config = Config::load(config_path)?;
    let state = AppState::from_config(&config).await?;

    let archive = BackupManager::new(
        state.documents.as_ref(),
        state.objects.as_ref(),
        state.backup.clone(),
    )
    .create()
    .await
    .context("Backup failed")?;

    let (spool, report) = archive.into_parts();
    let mut source = tokio::fs::File::from_std(spool);
    let mut target = tokio::fs::File::create(&args.output)
        .await
        .with_context(|| format!("Failed to create {}", args.output))?;
    tokio::io::copy(&mut source, &mut target)
        .await
        .with_context(|| format!("Failed to write {}", args.output))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::success(&format!("Backup written to {}", args.output));
    output::kv("Run", &report.run_id);
    output::kv("Collections", &report.collections.to_string());
    output::kv("Documents", &report.documents.to_string());
    output::kv("Objects", &report.objects.to_string());
    output::kv("Size", &format!("{} bytes", report.archive_bytes));
    Ok(())
}

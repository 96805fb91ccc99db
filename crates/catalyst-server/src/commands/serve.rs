//! Serve command

use anyhow::{Context, Result};
use camino::Utf8Path;
use catalyst_server::{routes, AppState, Config};
use clap::Args;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides server.bind)
    #[arg(long)]
    pub bind: Option<String>,
}

pub async fn run(args: ServeArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let state = AppState::from_config(&config).await?;
    let app = routes::router(state, &config.server.prefix, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        "Listening on http://{}{}/backup",
        listener.local_addr()?,
        config.server.prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

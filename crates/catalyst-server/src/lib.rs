//! HTTP surface for Catalyst backup and restore
//!
//! Mounts the two backup routes on an axum router, guarded by a capability
//! check and a single-operation gate:
//!
//! - `GET {prefix}/backup/create` requires `backup:create` and answers with the
//!   archive as `application/zip`
//! - `POST {prefix}/backup/restore` requires `backup:restore` and takes the
//!   archive in the multipart field `backup`
//!
//! # Example
//!
//! ```no_run
//! use catalyst_server::{config::Config, routes, AppState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let state = AppState::from_config(&config).await?;
//! let app = routes::router(state, &config.server.prefix, config.server.max_upload_bytes);
//!
//! let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::{AllowAll, Authorizer, Capability, TokenAuthorizer, TokenConfig};
pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

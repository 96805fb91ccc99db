//! Backup and restore routes
//!
//! - `GET {prefix}/backup/create` streams a freshly built archive
//! - `POST {prefix}/backup/restore` restores from the multipart field `backup`

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use catalyst_backup::{BackupManager, Error, RestoreManager, RestoreReport};
use std::fs::File;
use std::io::Seek;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::Capability;
use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field carrying the archive on restore.
pub const UPLOAD_FIELD: &str = "backup";

/// File name suggested to clients downloading a backup.
pub const DOWNLOAD_NAME: &str = "backup.zip";

/// Build the router with the backup routes mounted under `prefix`.
pub fn router(state: AppState, prefix: &str, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(&format!("{}/backup/create", prefix), get(create_backup))
        .route(
            &format!("{}/backup/restore", prefix),
            post(restore_backup).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .authorizer
        .authorize(&headers, Capability::BackupCreate)?;
    let _guard = state.try_begin()?;

    let manager = BackupManager::new(
        state.documents.as_ref(),
        state.objects.as_ref(),
        state.backup.clone(),
    );
    let archive = state.run(manager.create()).await?;

    let size = archive.size();
    let (file, report) = archive.into_parts();
    info!(
        "Serving backup {} ({} bytes, {} documents, {} objects)",
        report.run_id, size, report.documents, report.objects
    );

    let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(file)));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_NAME),
            ),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        body,
    )
        .into_response())
}

async fn restore_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RestoreReport>, ApiError> {
    state
        .authorizer
        .authorize(&headers, Capability::BackupRestore)?;
    let _guard = state.try_begin()?;

    let mut multipart = multipart.map_err(|e| Error::invalid_upload(e.body_text()))?;
    let upload = receive_upload(&mut multipart).await?;

    let manager = RestoreManager::new(state.documents.as_ref(), state.objects.as_ref())
        .with_batch_size(state.restore_batch_size);
    let report = state.run(manager.restore(upload)).await?;

    info!(
        "Restored {} collections, {} documents, {} objects",
        report.collections, report.documents, report.objects
    );
    Ok(Json(report))
}

/// Spool the `backup` field to an anonymous temporary file, rewound for reading.
async fn receive_upload(multipart: &mut Multipart) -> Result<File, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_upload(e.body_text()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return spool_field(field).await;
        }
        debug!("Ignoring multipart field {:?}", field.name());
    }

    Err(Error::invalid_upload(format!("missing multipart field `{}`", UPLOAD_FIELD)).into())
}

async fn spool_field(mut field: Field<'_>) -> Result<File, ApiError> {
    let mut spool = tokio::fs::File::from_std(tempfile::tempfile()?);

    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| Error::invalid_upload(e.body_text()))?
    {
        spool.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    spool.flush().await?;

    let mut file = spool.into_std().await;
    file.rewind()?;
    debug!("Received upload of {} bytes", size);
    Ok(file)
}

//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalyst_backup::ErrorKind;
use std::time::Duration;
use tracing::{error, warn};

/// Error returned by the backup routes.
#[derive(Debug)]
pub enum ApiError {
    Backup(catalyst_backup::Error),
    Unauthorized(String),
    Forbidden(String),
    /// Another backup or restore is running
    Busy,
    Timeout(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Backup(err) => match err.kind() {
                ErrorKind::BadInput => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Machine-readable error kind included in the response body
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Backup(err) => err.code(),
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Busy => "busy",
            ApiError::Timeout(_) => "timeout",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Backup(err) => err.to_string(),
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => msg.clone(),
            ApiError::Busy => "another backup or restore is in progress".to_string(),
            ApiError::Timeout(limit) => {
                format!("operation exceeded the {}s limit", limit.as_secs())
            }
        }
    }
}

impl From<catalyst_backup::Error> for ApiError {
    fn from(err: catalyst_backup::Error) -> Self {
        ApiError::Backup(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Backup(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            error!("{} ({})", message, self.kind());
        } else {
            warn!("{} ({})", message, self.kind());
        }

        let body = Json(serde_json::json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

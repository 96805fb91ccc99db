//! Capability checks for the backup routes.
//!
//! Callers present a token either in the `PRIVATE-TOKEN` header or as an
//! `Authorization: Bearer` credential. Each configured token carries the
//! capabilities it grants.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Header carrying a raw access token.
pub const PRIVATE_TOKEN_HEADER: &str = "private-token";

/// Permission required by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "backup:create")]
    BackupCreate,

    #[serde(rename = "backup:restore")]
    BackupRestore,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::BackupCreate => "backup:create",
            Capability::BackupRestore => "backup:restore",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured access token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Label used in logs
    pub name: String,

    pub token: String,

    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Decides whether a request may perform an operation.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap, capability: Capability) -> Result<(), ApiError>;
}

/// Static token table.
#[derive(Debug, Default)]
pub struct TokenAuthorizer {
    tokens: HashMap<String, TokenConfig>,
}

impl TokenAuthorizer {
    pub fn new(tokens: impl IntoIterator<Item = TokenConfig>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| (token.token.clone(), token))
                .collect(),
        }
    }
}

impl Authorizer for TokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap, capability: Capability) -> Result<(), ApiError> {
        let presented = presented_token(headers)
            .ok_or_else(|| ApiError::Unauthorized("missing access token".to_string()))?;

        let token = self
            .tokens
            .get(presented)
            .ok_or_else(|| ApiError::Unauthorized("invalid access token".to_string()))?;

        if !token.capabilities.contains(&capability) {
            warn!("Token {} lacks capability {}", token.name, capability);
            return Err(ApiError::Forbidden(format!("missing capability {}", capability)));
        }

        debug!("Token {} granted {}", token.name, capability);
        Ok(())
    }
}

/// Grants everything.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap, _capability: Capability) -> Result<(), ApiError> {
        Ok(())
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(PRIVATE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return Some(token.trim());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

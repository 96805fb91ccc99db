//! Server configuration
//!
//! Loaded with the following precedence (low to high):
//! 1. Built-in defaults
//! 2. YAML file (`--config`, or `catalyst.yaml` / `catalyst.yml` in the working directory)
//! 3. Environment variables (`CATALYST_*` prefix)

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use catalyst_backup::{BackupConfig, DEFAULT_BATCH_SIZE, DEFAULT_COMPRESSION_LEVEL};
use catalyst_stores::{ArangoConfig, S3Config};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::TokenConfig;

/// File names looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["catalyst.yaml", "catalyst.yml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,

    pub backup: BackupSettings,

    /// ArangoDB connection; the in-memory document store is used when absent
    pub arango: Option<ArangoConfig>,

    /// S3/MinIO connection; the in-memory object store is used when absent
    pub storage: Option<S3Config>,

    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// Path prefix of the backup routes, e.g. `/api`
    pub prefix: String,

    /// Largest accepted restore upload
    pub max_upload_bytes: usize,

    /// Upper bound for a single backup or restore run
    pub operation_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            prefix: "/api".to_string(),
            max_upload_bytes: 1024 * 1024 * 1024,
            operation_timeout_secs: 3600,
        }
    }
}

impl ServerConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub batch_size: usize,

    pub compression_level: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Skip capability checks entirely (local development only)
    pub disabled: bool,

    pub tokens: Vec<TokenConfig>,
}

impl Config {
    /// Load configuration from `path`, or from the default file names when `None`.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let config = match Self::locate(path)? {
            Some(path) => Self::load_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        let mut config = config.apply_env_overrides(|key| env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    fn locate(path: Option<&Utf8Path>) -> Result<Option<Utf8PathBuf>> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(anyhow!("Configuration file not found: {}", path));
            }
            return Ok(Some(path.to_path_buf()));
        }

        Ok(DEFAULT_CONFIG_FILES
            .iter()
            .map(Utf8PathBuf::from)
            .find(|candidate| candidate.exists()))
    }

    fn load_file(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path))?;
        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self = serde_yaml_ng::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply `CATALYST_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CATALYST_BIND") {
            self.server.bind = val;
        }

        if let Some(val) = lookup("CATALYST_PREFIX") {
            self.server.prefix = val;
        }

        if let Some(val) = lookup("CATALYST_MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = val
                .parse()
                .map_err(|_| anyhow!("CATALYST_MAX_UPLOAD_BYTES must be a valid number"))?;
        }

        if let Some(val) = lookup("CATALYST_OPERATION_TIMEOUT_SECS") {
            self.server.operation_timeout_secs = val
                .parse()
                .map_err(|_| anyhow!("CATALYST_OPERATION_TIMEOUT_SECS must be a valid number"))?;
        }

        // Database
        if let Some(val) = lookup("CATALYST_ARANGO_URL") {
            self.arango.get_or_insert_with(ArangoConfig::default).url = val;
        }

        if let Some(val) = lookup("CATALYST_ARANGO_PASSWORD") {
            self.arango.get_or_insert_with(ArangoConfig::default).password = Some(val);
        }

        // Object storage
        if let Some(val) = lookup("CATALYST_S3_ENDPOINT") {
            self.storage.get_or_insert_with(S3Config::default).endpoint = Some(val);
        }

        Ok(self)
    }

    /// Route prefix with a leading slash and no trailing slash; empty for the root.
    fn normalize(&mut self) {
        let prefix = self.server.prefix.trim().trim_matches('/');
        self.server.prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", prefix)
        };
        self.backup.compression_level = self.backup.compression_level.clamp(1, 9);
        self.backup.batch_size = self.backup.batch_size.max(1);
    }

    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig::default()
            .with_batch_size(self.backup.batch_size)
            .with_compression_level(self.backup.compression_level)
    }
}

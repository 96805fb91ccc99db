//! Shared application state

use anyhow::Result;
use catalyst_backup::{
    BackupConfig, DocumentStore, MemoryDocumentStore, MemoryObjectStore, ObjectStore,
    DEFAULT_BATCH_SIZE,
};
use catalyst_stores::{ArangoDocumentStore, S3ObjectStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::auth::{AllowAll, Authorizer, TokenAuthorizer};
use crate::config::Config;
use crate::error::ApiError;

/// Stores, policies and the operation gate shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub backup: BackupConfig,
    pub restore_batch_size: usize,
    pub operation_timeout: Duration,
    gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            documents,
            objects,
            authorizer,
            backup: BackupConfig::default(),
            restore_batch_size: DEFAULT_BATCH_SIZE,
            operation_timeout: Duration::from_secs(3600),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_backup_config(mut self, backup: BackupConfig) -> Self {
        self.restore_batch_size = backup.batch_size;
        self.backup = backup;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Build the state from configuration, connecting to the configured stores.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let documents: Arc<dyn DocumentStore> = match &config.arango {
            Some(arango) => {
                let store = ArangoDocumentStore::new(arango.clone())?;
                if let Err(e) = store.ping().await {
                    warn!("ArangoDB not reachable yet: {:#}", e);
                }
                Arc::new(store)
            }
            None => {
                warn!("No arango section configured, using an in-memory document store");
                Arc::new(MemoryDocumentStore::default())
            }
        };

        let objects: Arc<dyn ObjectStore> = match &config.storage {
            Some(storage) => Arc::new(S3ObjectStore::new(storage).await?),
            None => {
                warn!("No storage section configured, using an in-memory object store");
                Arc::new(MemoryObjectStore::new())
            }
        };

        let authorizer: Arc<dyn Authorizer> = if config.auth.disabled {
            warn!("Authorization disabled, every caller may back up and restore");
            Arc::new(AllowAll)
        } else {
            info!("Loaded {} access tokens", config.auth.tokens.len());
            Arc::new(TokenAuthorizer::new(config.auth.tokens.clone()))
        };

        Ok(Self::new(documents, objects, authorizer)
            .with_backup_config(config.backup_config())
            .with_operation_timeout(config.server.operation_timeout()))
    }

    /// Claims the operation gate; fails with [`ApiError::Busy`] while another operation holds it.
    pub fn try_begin(&self) -> Result<OwnedMutexGuard<()>, ApiError> {
        self.gate.clone().try_lock_owned().map_err(|_| ApiError::Busy)
    }

    /// Runs `operation` under the configured time limit.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, ApiError>
    where
        F: Future<Output = catalyst_backup::Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, operation).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::Timeout(self.operation_timeout)),
        }
    }
}

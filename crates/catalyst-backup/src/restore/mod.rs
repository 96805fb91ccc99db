//! Restore system
//!
//! Restore is strictly ordered and not transactional across stores: every known
//! collection is truncated, objects are written, then each archived collection has
//! its structure applied and its documents inserted. A failure after truncation
//! leaves whatever state had been reached; there is no rollback.

use bytes::Bytes;
use futures::stream;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Read, Seek};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod plan;
mod pipeline;

pub use plan::{CollectionRestore, ObjectEntry, RestorePlan};

use crate::archive::ArchiveReader;
use crate::collection::Collection;
use crate::error::{join_error, Error, Result};
use crate::store::{ByteStream, DocumentStore, ObjectStore, DEFAULT_BATCH_SIZE};
use pipeline::RestoreEvent;

/// Summary of a finished restore.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// Collections whose structure was applied
    pub collections: usize,

    /// Documents inserted across all collections
    pub documents: usize,

    pub objects: usize,

    pub buckets_created: usize,

    /// Content of the archive's encryption marker
    pub source_encryption: String,

    #[serde(with = "crate::backup::duration_secs")]
    pub duration: Duration,
}

pub struct RestoreManager<'a> {
    documents: &'a dyn DocumentStore,
    objects: &'a dyn ObjectStore,
    batch_size: usize,
}

impl<'a> RestoreManager<'a> {
    pub fn new(documents: &'a dyn DocumentStore, objects: &'a dyn ObjectStore) -> Self {
        Self {
            documents,
            objects,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Documents handed to a single bulk insert.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Restores the stores from the archive in `source`.
    pub async fn restore<R>(&self, source: R) -> Result<RestoreReport>
    where
        R: Read + Seek + Send + 'static,
    {
        let start = Instant::now();

        // Stage 1: Validation
        info!("Stage 1/3: Reading archive index");
        let (reader, plan) = tokio::task::spawn_blocking(move || {
            let mut reader = ArchiveReader::open(source)?;
            let plan = RestorePlan::build(&mut reader)?;
            Ok::<_, Error>((reader, plan))
        })
        .await
        .map_err(join_error)??;

        info!(
            "Archive: {} collections, {} objects, encryption={}",
            plan.collections.len(),
            plan.objects.len(),
            plan.encryption
        );
        if let Some(manifest) = &plan.manifest {
            info!(
                "Backup of database {} taken {} by {}",
                manifest.database, manifest.created_at, manifest.created_by
            );
        }

        // Stage 2: Truncate
        info!("Stage 2/3: Truncating {} collections", Collection::ALL.len());
        for collection in Collection::ALL {
            self.documents
                .truncate(collection)
                .await
                .map_err(|e| Error::store(format!("truncate {}", collection), e))?;
        }

        // Stage 3: Restore
        info!("Stage 3/3: Restoring objects and collections");
        let mut report = RestoreReport {
            collections: 0,
            documents: 0,
            objects: 0,
            buckets_created: 0,
            source_encryption: plan.encryption.to_string(),
            duration: Duration::ZERO,
        };

        let (events_tx, mut events_rx) = mpsc::channel(pipeline::EVENT_CHANNEL_CAPACITY);
        let batch_size = self.batch_size;
        let producer = tokio::task::spawn_blocking(move || {
            pipeline::produce(reader, plan, events_tx, batch_size)
        });

        let mut ensured = HashSet::new();
        let outcome = async {
            while let Some(event) = events_rx.recv().await {
                self.apply(event?, &mut ensured, &mut report).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        drop(events_rx);
        producer.await.map_err(join_error)?;

        if let Err(e) = outcome {
            warn!("Restore failed: {}", e);
            return Err(e);
        }

        report.duration = start.elapsed();
        info!(
            "Restore complete: collections={}, documents={}, objects={}, duration={:?}",
            report.collections, report.documents, report.objects, report.duration
        );

        Ok(report)
    }

    async fn apply(
        &self,
        event: RestoreEvent,
        ensured: &mut HashSet<String>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        match event {
            RestoreEvent::Object { bucket, key, body } => {
                if !ensured.contains(&bucket) {
                    let exists = self
                        .objects
                        .bucket_exists(&bucket)
                        .await
                        .map_err(|e| Error::store(format!("check bucket {}", bucket), e))?;
                    if !exists {
                        self.objects
                            .create_bucket(&bucket)
                            .await
                            .map_err(|e| Error::store(format!("create bucket {}", bucket), e))?;
                        info!("Created bucket {}", bucket);
                        report.buckets_created += 1;
                    }
                    ensured.insert(bucket.clone());
                }

                let written = self
                    .objects
                    .put_object(&bucket, &key, body_stream(body))
                    .await
                    .map_err(|e| unwrap_store_error(format!("put object {}/{}", bucket, key), e))?;
                debug!("Restored {}/{} ({} bytes)", bucket, key, written);
                report.objects += 1;
            }
            RestoreEvent::Structure {
                collection,
                structure,
            } => {
                self.documents
                    .apply_structure(collection, &structure)
                    .await
                    .map_err(|e| Error::store(format!("apply structure of {}", collection), e))?;
                debug!("Applied structure of {}", collection);
                report.collections += 1;
            }
            RestoreEvent::Documents {
                collection,
                documents,
            } => {
                let inserted = self
                    .documents
                    .insert_documents(collection, documents)
                    .await
                    .map_err(|e| Error::store(format!("insert into {}", collection), e))?;
                debug!("Inserted {} documents into {}", inserted, collection);
                report.documents += inserted;
            }
        }

        Ok(())
    }
}

fn body_stream(body: mpsc::Receiver<Result<Bytes>>) -> ByteStream {
    Box::pin(stream::unfold(body, |mut body| async move {
        body.recv()
            .await
            .map(|chunk| (chunk.map_err(anyhow::Error::from), body))
    }))
}

// Archive decoding errors travel through the object store inside the body stream.
fn unwrap_store_error(operation: String, err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(inner) => inner,
        Err(err) => Error::store(operation, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupConfig, BackupManager};
    use crate::store::{bytes_body, MemoryDocumentStore, MemoryObjectStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_counts() {
        let documents = MemoryDocumentStore::default();
        documents
            .insert_documents(
                Collection::Tickets,
                vec![json!({"_key": "1"}), json!({"_key": "2"})],
            )
            .await
            .unwrap();
        let objects = MemoryObjectStore::new();
        objects.create_bucket("catalyst-1").await.unwrap();
        objects
            .put_object("catalyst-1", "a.txt", bytes_body("a"))
            .await
            .unwrap();

        let archive = BackupManager::new(&documents, &objects, BackupConfig::default())
            .create()
            .await
            .unwrap();

        let target_documents = MemoryDocumentStore::default();
        let target_objects = MemoryObjectStore::new();
        let report = RestoreManager::new(&target_documents, &target_objects)
            .restore(archive.into_file())
            .await
            .unwrap();

        assert_eq!(report.collections, 11);
        assert_eq!(report.documents, 2);
        assert_eq!(report.objects, 1);
        assert_eq!(report.buckets_created, 1);
        assert_eq!(report.source_encryption, "none");
        assert_eq!(
            target_objects.object("catalyst-1", "a.txt").await.unwrap(),
            Bytes::from("a")
        );
    }

    #[tokio::test]
    async fn test_existing_bucket_is_reused() {
        let documents = MemoryDocumentStore::default();
        let objects = MemoryObjectStore::new();
        objects.create_bucket("b").await.unwrap();
        for key in ["1", "2", "3"] {
            objects.put_object("b", key, bytes_body(key)).await.unwrap();
        }
        let archive = BackupManager::new(&documents, &objects, BackupConfig::default())
            .create()
            .await
            .unwrap();

        let report = RestoreManager::new(&documents, &objects)
            .restore(archive.into_file())
            .await
            .unwrap();
        assert_eq!(report.objects, 3);
        assert_eq!(report.buckets_created, 0);
    }

    #[test]
    fn test_unwrap_store_error_keeps_decoding_errors() {
        let err = anyhow::Error::from(Error::corrupt_data("minio/b/k", "bad"));
        assert_eq!(
            unwrap_store_error("put".into(), err).code(),
            "corrupt_data_stream"
        );

        let err = anyhow::anyhow!("connection reset");
        assert_eq!(unwrap_store_error("put".into(), err).code(), "store_failure");
    }
}

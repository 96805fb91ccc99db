//! In-memory store implementations.
//!
//! Used by the test suites and by the server's development mode when no
//! database or object storage endpoint is configured.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, TryStreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{ByteStream, DocumentBatch, DocumentStore, ObjectStore};
use crate::collection::Collection;
use crate::structure::CollectionStructure;

/// Chunk size used when streaming stored objects back out
const OBJECT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct MemoryCollection {
    structure: CollectionStructure,
    documents: BTreeMap<String, Value>,
}

impl MemoryCollection {
    fn new(collection: Collection) -> Self {
        Self {
            structure: CollectionStructure::for_collection(collection),
            documents: BTreeMap::new(),
        }
    }
}

/// Document store keeping every collection in memory, ordered by `_key`.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    database: String,
    encrypted: bool,
    collections: RwLock<HashMap<Collection, MemoryCollection>>,
    failing_exports: RwLock<HashSet<Collection>>,
    next_key: AtomicU64,
}

impl MemoryDocumentStore {
    /// Creates a store holding every known collection, all empty.
    pub fn new(database: impl Into<String>) -> Self {
        let collections = Collection::ALL
            .into_iter()
            .map(|c| (c, MemoryCollection::new(c)))
            .collect();

        Self {
            database: database.into(),
            encrypted: false,
            collections: RwLock::new(collections),
            failing_exports: RwLock::new(HashSet::new()),
            next_key: AtomicU64::new(1),
        }
    }

    pub fn with_encryption(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Makes every subsequent export of `collection` fail.
    pub async fn fail_exports(&self, collection: Collection) {
        self.failing_exports.write().await.insert(collection);
    }

    /// Removes a collection entirely, as if it had never been created.
    pub async fn drop_collection(&self, collection: Collection) {
        self.collections.write().await.remove(&collection);
    }

    pub async fn has_collection(&self, collection: Collection) -> bool {
        self.collections.read().await.contains_key(&collection)
    }

    pub async fn document(&self, collection: Collection, key: &str) -> Option<Value> {
        self.collections
            .read()
            .await
            .get(&collection)
            .and_then(|c| c.documents.get(key).cloned())
    }

    /// All documents of a collection in key order.
    pub async fn documents(&self, collection: Collection) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    pub async fn current_structure(&self, collection: Collection) -> Option<CollectionStructure> {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|c| c.structure.clone())
    }

    fn document_key(&self, document: &mut Value) -> Result<String> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| anyhow!("document is not a JSON object"))?;

        match object.get("_key") {
            Some(Value::String(key)) => Ok(key.clone()),
            Some(other) => bail!("document _key must be a string, got {}", other),
            None => {
                let key = self.next_key.fetch_add(1, Ordering::Relaxed).to_string();
                object.insert("_key".to_string(), Value::String(key.clone()));
                Ok(key)
            }
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new("catalyst")
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn encryption_at_rest(&self) -> bool {
        self.encrypted
    }

    async fn structure(&self, collection: Collection) -> Result<CollectionStructure> {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|c| c.structure.clone())
            .ok_or_else(|| anyhow!("collection {} not found", collection))
    }

    async fn export_batch(
        &self,
        collection: Collection,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<DocumentBatch> {
        if self.failing_exports.read().await.contains(&collection) {
            bail!("cursor on collection {} failed", collection);
        }

        let collections = self.collections.read().await;
        let stored = collections
            .get(&collection)
            .ok_or_else(|| anyhow!("collection {} not found", collection))?;

        let remaining: Box<dyn Iterator<Item = (&String, &Value)>> = match cursor {
            Some(after) => Box::new(
                stored
                    .documents
                    .range::<String, _>((
                        std::ops::Bound::Excluded(after),
                        std::ops::Bound::Unbounded,
                    )),
            ),
            None => Box::new(stored.documents.iter()),
        };

        let mut remaining = remaining.peekable();
        let mut documents = Vec::with_capacity(batch_size.min(stored.documents.len()));
        let mut last_key = None;
        while documents.len() < batch_size.max(1) {
            match remaining.next() {
                Some((key, document)) => {
                    documents.push(document.clone());
                    last_key = Some(key.clone());
                }
                None => break,
            }
        }

        let cursor = if remaining.peek().is_some() {
            last_key
        } else {
            None
        };

        Ok(DocumentBatch { documents, cursor })
    }

    async fn truncate(&self, collection: Collection) -> Result<()> {
        if let Some(stored) = self.collections.write().await.get_mut(&collection) {
            stored.documents.clear();
        }
        Ok(())
    }

    async fn apply_structure(
        &self,
        collection: Collection,
        structure: &CollectionStructure,
    ) -> Result<()> {
        if structure.parameters.name != collection.name() {
            bail!(
                "structure for {} cannot be applied to {}",
                structure.parameters.name,
                collection
            );
        }

        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(collection)
            .or_insert_with(|| MemoryCollection::new(collection));
        stored.structure = structure.clone();
        Ok(())
    }

    async fn insert_documents(
        &self,
        collection: Collection,
        documents: Vec<Value>,
    ) -> Result<usize> {
        let mut keyed = Vec::with_capacity(documents.len());
        for mut document in documents {
            let key = self.document_key(&mut document)?;
            keyed.push((key, document));
        }

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection)
            .ok_or_else(|| anyhow!("collection {} not found", collection))?;

        let inserted = keyed.len();
        stored.documents.extend(keyed);
        Ok(inserted)
    }
}

/// Object store keeping buckets and objects in memory, ordered by name.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
    failing_listings: RwLock<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent object listing of `bucket` fail.
    pub async fn fail_listing(&self, bucket: &str) {
        self.failing_listings.write().await.insert(bucket.to_string());
    }

    /// Full content of an object, if present.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            bail!("bucket {} already exists", bucket);
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets
            .write()
            .await
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| anyhow!("bucket {} does not exist", bucket))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        if self.failing_listings.read().await.contains(bucket) {
            bail!("listing bucket {} failed", bucket);
        }

        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| anyhow!("bucket {} does not exist", bucket))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let body = self
            .object(bucket, key)
            .await
            .ok_or_else(|| anyhow!("object {}/{} does not exist", bucket, key))?;

        let chunks: Vec<Result<Bytes>> = (0..body.len())
            .step_by(OBJECT_CHUNK_SIZE)
            .map(|start| Ok(body.slice(start..(start + OBJECT_CHUNK_SIZE).min(body.len()))))
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<u64> {
        if !self.bucket_exists(bucket).await? {
            bail!("bucket {} does not exist", bucket);
        }

        let content = body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?
            .freeze();
        let size = content.len() as u64;

        self.buckets
            .write()
            .await
            .get_mut(bucket)
            .ok_or_else(|| anyhow!("bucket {} does not exist", bucket))?
            .insert(key.to_string(), content);

        Ok(size)
    }
}

/// Wraps a complete in-memory body as a single-chunk [`ByteStream`].
pub fn bytes_body(content: impl Into<Bytes>) -> ByteStream {
    let content = content.into();
    Box::pin(stream::once(async move { Ok(content) }))
}

//! Collaborator interfaces for the two storage engines.
//!
//! The surrounding service owns the concrete clients; backup and restore only
//! borrow them for the duration of one operation.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::collection::Collection;
use crate::structure::CollectionStructure;

pub mod memory;

pub use memory::{bytes_body, MemoryDocumentStore, MemoryObjectStore};

/// Object body as a stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Default number of documents fetched per export page.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// One page of an export cursor.
#[derive(Debug, Clone, Default)]
pub struct DocumentBatch {
    pub documents: Vec<Value>,

    /// Cursor for the next page, `None` once the collection is exhausted
    pub cursor: Option<String>,
}

/// Document database handle
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database, recorded in the dump manifest
    fn database_name(&self) -> &str;

    /// Whether the database encrypts data at rest
    fn encryption_at_rest(&self) -> bool {
        false
    }

    /// Read the structure descriptor without scanning documents
    async fn structure(&self, collection: Collection) -> Result<CollectionStructure>;

    /// Fetch the next page of documents; `cursor` is `None` for the first page
    async fn export_batch(
        &self,
        collection: Collection,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<DocumentBatch>;

    /// Release an export cursor that will not be read to the end
    async fn discard_cursor(&self, _cursor: &str) -> Result<()> {
        Ok(())
    }

    /// Remove every document; a missing or empty collection is a no-op
    async fn truncate(&self, collection: Collection) -> Result<()>;

    /// Create the collection if absent and ensure its indexes exist
    async fn apply_structure(
        &self,
        collection: Collection,
        structure: &CollectionStructure,
    ) -> Result<()>;

    /// Bulk insert, replacing documents whose key already exists
    async fn insert_documents(&self, collection: Collection, documents: Vec<Value>)
        -> Result<usize>;
}

/// Object storage client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Delete a bucket together with every object in it
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream>;

    /// Store `body` under `key`, overwriting any existing object; returns bytes written
    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<u64>;
}

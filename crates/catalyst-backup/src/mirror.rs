//! Object storage mirror.
//!
//! Enumerates every bucket and object so the backup can copy them byte for
//! byte into the archive under `minio/<bucket>/<key>`.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::archive;
use crate::error::{Error, Result};
use crate::store::{ByteStream, ObjectStore};

/// Location of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Archive entry name this object is stored under.
    pub fn entry_name(&self) -> String {
        archive::object_entry(&self.bucket, &self.key)
    }
}

/// Reads objects out of an object store for archiving.
pub struct ObjectMirror<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectMirror<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Every object of every bucket, sorted by bucket then key.
    ///
    /// A listing failure on any bucket fails the whole inventory; a backup must
    /// not silently miss a bucket.
    pub async fn inventory(&self) -> Result<Vec<ObjectRef>> {
        let mut buckets = self
            .store
            .list_buckets()
            .await
            .map_err(|e| Error::store("list buckets", e))?;
        buckets.sort();

        let mut objects = Vec::new();
        for bucket in buckets {
            let mut keys = self
                .store
                .list_objects(&bucket)
                .await
                .map_err(|e| Error::store(format!("list objects of {}", bucket), e))?;
            keys.sort();
            debug!("Bucket {} holds {} objects", bucket, keys.len());

            objects.extend(keys.into_iter().map(|key| ObjectRef::new(bucket.clone(), key)));
        }

        Ok(objects)
    }

    pub async fn open(&self, object: &ObjectRef) -> Result<ByteStream> {
        self.store
            .get_object(&object.bucket, &object.key)
            .await
            .map_err(|e| Error::store(format!("get object {}/{}", object.bucket, object.key), e))
    }

    /// Object body with read failures reported as store failures.
    pub async fn chunks(&self, object: &ObjectRef) -> Result<BoxStream<'static, Result<Bytes>>> {
        let operation = format!("read object {}/{}", object.bucket, object.key);
        let body = self.open(object).await?;
        Ok(body
            .map_err(move |e| Error::store(operation.clone(), e))
            .boxed())
    }
}

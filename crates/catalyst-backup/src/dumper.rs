//! Collection dumper.
//!
//! Produces the structure descriptor and the document pages of one collection.
//! Documents are pulled page by page through the store's export cursor and
//! encoded as JSON lines; gzip compression happens on the archive writer's
//! thread, so a collection is never held in memory beyond one page.

use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::store::DocumentStore;

/// Stream of documents exported from one collection.
pub type DocumentStream<'a> = BoxStream<'a, Result<Value>>;

/// Stream of export pages of one collection.
pub type PageStream<'a> = BoxStream<'a, Result<Vec<Value>>>;

/// Export cursor still open on the server while a page stream is not drained.
#[derive(Debug, Clone, Default)]
pub struct OpenCursor(Arc<Mutex<Option<String>>>);

impl OpenCursor {
    fn set(&self, cursor: Option<String>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = cursor;
        }
    }

    /// Takes the cursor id if the export stopped before its last page.
    pub fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Structure bytes plus the pending pages of one collection.
pub struct CollectionDump<'a> {
    pub collection: Collection,

    /// Serialized structure descriptor
    pub structure: Vec<u8>,

    pub pages: PageStream<'a>,

    /// Cursor to discard if `pages` is abandoned
    pub cursor: OpenCursor,
}

/// Counters for one written data stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataStats {
    pub documents: usize,

    /// Uncompressed JSON bytes, newlines included
    pub bytes: u64,
}

enum Page {
    First,
    Next(String),
    Done,
}

/// Dumps collections from a document store.
pub struct CollectionDumper<'a> {
    store: &'a dyn DocumentStore,
    batch_size: usize,
}

impl<'a> CollectionDumper<'a> {
    pub fn new(store: &'a dyn DocumentStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Serialized structure descriptor of `collection`.
    pub async fn structure(&self, collection: Collection) -> Result<Vec<u8>> {
        let structure = self
            .store
            .structure(collection)
            .await
            .map_err(|e| Error::store(format!("read structure of {}", collection), e))?;
        Ok(structure.to_json()?)
    }

    /// Every document of `collection`, fetched lazily page by page.
    pub fn documents(&self, collection: Collection) -> DocumentStream<'a> {
        self.pages(collection, OpenCursor::default())
            .map_ok(|documents| stream::iter(documents.into_iter().map(Ok::<Value, Error>)))
            .try_flatten()
            .boxed()
    }

    fn pages(&self, collection: Collection, open: OpenCursor) -> PageStream<'a> {
        let store = self.store;
        let batch_size = self.batch_size;

        stream::try_unfold(Page::First, move |page| {
            let open = open.clone();
            async move {
                let cursor = match page {
                    Page::Done => return Ok(None),
                    Page::First => None,
                    Page::Next(cursor) => Some(cursor),
                };

                let batch = store
                    .export_batch(collection, cursor, batch_size)
                    .await
                    .map_err(|e| Error::store(format!("export {}", collection), e))?;
                debug!("Exported {} documents from {}", batch.documents.len(), collection);

                let next = match batch.cursor {
                    Some(cursor) if !batch.documents.is_empty() => {
                        open.set(Some(cursor.clone()));
                        Page::Next(cursor)
                    }
                    _ => {
                        open.set(None);
                        Page::Done
                    }
                };
                Ok(Some((batch.documents, next)))
            }
        })
        .boxed()
    }

    pub async fn dump(&self, collection: Collection) -> Result<CollectionDump<'a>> {
        let cursor = OpenCursor::default();
        Ok(CollectionDump {
            collection,
            structure: self.structure(collection).await?,
            pages: self.pages(collection, cursor.clone()),
            cursor,
        })
    }

    /// Releases the export cursor of an abandoned dump. Failures are only logged.
    pub async fn discard(&self, collection: Collection, cursor: &OpenCursor) {
        let Some(id) = cursor.take() else {
            return;
        };

        match self.store.discard_cursor(&id).await {
            Ok(()) => debug!("Discarded export cursor {} of {}", id, collection),
            Err(e) => warn!("Failed to discard export cursor {} of {}: {:#}", id, collection, e),
        }
    }
}

/// Encodes `documents` as JSON lines, one document per line.
pub fn encode_lines(documents: &[Value]) -> Result<Vec<u8>> {
    let mut lines = Vec::new();
    for document in documents {
        serde_json::to_writer(&mut lines, document)?;
        lines.push(b'\n');
    }
    Ok(lines)
}

/// Gzip-compresses encoded JSON lines into `sink`.
///
/// An empty input still produces a complete gzip member.
pub fn compress_lines<W, I>(chunks: I, sink: W, compression_level: u32) -> io::Result<W>
where
    W: Write,
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut encoder = GzEncoder::new(sink, Compression::new(compression_level.clamp(1, 9)));
    for chunk in chunks {
        encoder.write_all(chunk.as_ref())?;
    }
    encoder.finish()
}

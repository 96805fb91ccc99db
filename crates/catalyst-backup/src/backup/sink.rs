//! Archive writing side of a backup.
//!
//! The ZIP encoder and gzip compression are blocking work, so the archive is
//! written on a blocking thread. The async side queues one entry at a time, each
//! with its own bounded chunk channel; dropping the chunk sender ends the entry.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::io::{self, Seek, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::archive::{ArchiveWriter, EntryCompression};
use crate::dumper;
use crate::error::{join_error, Error, Result};

/// Entries queued ahead of the writer
const ENTRY_CHANNEL_CAPACITY: usize = 2;

/// Chunks buffered per entry
const CHUNK_CHANNEL_CAPACITY: usize = 8;

/// How the chunks of an entry become its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyEncoding {
    /// Chunks are the body
    Raw,

    /// Chunks are JSON lines, gzip-compressed at the given level
    GzipLines(u32),
}

struct EntryRequest {
    name: String,
    compression: EntryCompression,
    encoding: BodyEncoding,
    chunks: mpsc::Receiver<Bytes>,
}

/// Queues entries onto the archive writer thread.
pub(crate) struct ArchiveSink {
    entries: mpsc::Sender<EntryRequest>,
}

/// The archive writer thread.
pub(crate) struct ArchiveTask<W> {
    handle: JoinHandle<Result<(W, usize)>>,
}

/// Body channel of one queued entry.
pub(crate) struct EntrySender {
    chunks: mpsc::Sender<Bytes>,
}

/// Starts the writer thread for an archive on `sink`.
pub(crate) fn spawn<W>(sink: W, compression_level: u32) -> (ArchiveSink, ArchiveTask<W>)
where
    W: Write + Seek + Send + 'static,
{
    let (entries_tx, entries_rx) = mpsc::channel(ENTRY_CHANNEL_CAPACITY);
    let writer = ArchiveWriter::new(sink, compression_level);
    let handle = tokio::task::spawn_blocking(move || write_entries(writer, entries_rx));

    (
        ArchiveSink {
            entries: entries_tx,
        },
        ArchiveTask { handle },
    )
}

impl ArchiveSink {
    pub(crate) async fn begin(
        &self,
        name: impl Into<String>,
        compression: EntryCompression,
        encoding: BodyEncoding,
    ) -> Result<EntrySender> {
        let (chunks_tx, chunks_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let request = EntryRequest {
            name: name.into(),
            compression,
            encoding,
            chunks: chunks_rx,
        };
        self.entries
            .send(request)
            .await
            .map_err(|_| writer_stopped())?;

        Ok(EntrySender { chunks: chunks_tx })
    }

    /// Queues a complete entry from an in-memory body.
    pub(crate) async fn write_bytes(
        &self,
        name: impl Into<String>,
        compression: EntryCompression,
        body: impl Into<Bytes>,
    ) -> Result<()> {
        self.begin(name, compression, BodyEncoding::Raw)
            .await?
            .send(body.into())
            .await
    }
}

impl EntrySender {
    pub(crate) async fn send(&self, chunk: Bytes) -> Result<()> {
        self.chunks.send(chunk).await.map_err(|_| writer_stopped())
    }

    /// Forwards every chunk of `chunks`; returns the bytes sent.
    pub(crate) async fn send_all<S>(&self, chunks: S) -> Result<u64>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut sent = 0u64;
        while let Some(chunk) = chunks.try_next().await? {
            sent += chunk.len() as u64;
            self.send(chunk).await?;
        }
        Ok(sent)
    }
}

impl<W> ArchiveTask<W> {
    /// Waits for the writer to close the archive; the sink must be dropped first.
    pub(crate) async fn join(self) -> Result<(W, usize)> {
        self.handle.await.map_err(join_error)?
    }
}

fn writer_stopped() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "archive writer stopped",
    ))
}

fn write_entries<W: Write + Seek>(
    mut writer: ArchiveWriter<W>,
    mut entries: mpsc::Receiver<EntryRequest>,
) -> Result<(W, usize)> {
    while let Some(request) = entries.blocking_recv() {
        let mut entry = writer.begin_entry(&request.name, request.compression)?;
        let mut chunks = request.chunks;
        let body = std::iter::from_fn(move || chunks.blocking_recv());

        match request.encoding {
            BodyEncoding::Raw => {
                for chunk in body {
                    entry.write_all(&chunk)?;
                }
            }
            BodyEncoding::GzipLines(level) => {
                dumper::compress_lines(body, &mut entry, level)?;
            }
        }
        debug!(
            "Wrote archive entry {} ({} bytes)",
            request.name,
            entry.bytes_written()
        );
    }

    let count = writer.entry_count();
    Ok((writer.close()?, count))
}

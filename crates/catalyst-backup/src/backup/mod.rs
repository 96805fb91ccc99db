//! Backup orchestration.
//!
//! Sequences one backup run: every known collection is dumped as a
//! structure/data pair, every stored object is mirrored, then the encryption
//! marker and the dump manifest are written and the archive is closed.
//! Any failure aborts the run and the partially written sink is discarded.

use bytes::Bytes;
use futures::TryStreamExt;
use serde::Serialize;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

mod sink;

use crate::archive::{self, EntryCompression, DEFAULT_COMPRESSION_LEVEL};
use crate::collection::Collection;
use crate::dumper::{self, CollectionDumper, DataStats, PageStream};
use crate::error::Result;
use crate::manifest::{DumpManifest, EncryptionMarker};
use crate::mirror::ObjectMirror;
use crate::store::{DocumentStore, ObjectStore, DEFAULT_BATCH_SIZE};
use sink::{ArchiveSink, BodyEncoding, EntrySender};

/// Configuration for backup runs.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Documents fetched per export page
    pub batch_size: usize,

    /// Deflate/gzip level (1-9)
    pub compression_level: u32,

    /// Fixed run suffix; a fresh one is generated per run when unset
    pub run_id: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            run_id: None,
        }
    }
}

impl BackupConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the compression level.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Summary of a finished backup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    /// Suffix shared by every structure/data pair of this run
    pub run_id: String,

    pub collections: usize,

    pub documents: usize,

    pub objects: usize,

    /// Object bytes copied into the archive
    pub object_bytes: u64,

    /// Size of the finished archive; zero until the sink is measured
    pub archive_bytes: u64,

    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// A finished backup spooled to an anonymous temporary file.
#[derive(Debug)]
pub struct BackupArchive {
    file: File,
    pub report: BackupReport,
}

impl BackupArchive {
    /// Size of the archive in bytes.
    pub fn size(&self) -> u64 {
        self.report.archive_bytes
    }

    /// The spool, rewound to the first byte.
    pub fn into_file(self) -> File {
        self.file
    }

    pub fn into_parts(self) -> (File, BackupReport) {
        (self.file, self.report)
    }
}

/// Creates backup archives from a document store and an object store.
pub struct BackupManager<'a> {
    documents: &'a dyn DocumentStore,
    objects: &'a dyn ObjectStore,
    config: BackupConfig,
}

impl<'a> BackupManager<'a> {
    pub fn new(
        documents: &'a dyn DocumentStore,
        objects: &'a dyn ObjectStore,
        config: BackupConfig,
    ) -> Self {
        Self {
            documents,
            objects,
            config,
        }
    }

    /// Runs a backup into an anonymous temporary file.
    ///
    /// The file is only handed out once the archive has been closed, so callers
    /// never see a partial archive.
    pub async fn create(&self) -> Result<BackupArchive> {
        let spool = tempfile::tempfile()?;
        let (mut file, mut report) = self.write_to(spool).await?;

        report.archive_bytes = file.seek(SeekFrom::End(0))?;
        file.rewind()?;

        Ok(BackupArchive { file, report })
    }

    /// Writes a complete backup archive into `sink` and hands it back.
    ///
    /// Archive encoding runs on a blocking thread; this task only pages through
    /// the stores and forwards what it reads.
    pub async fn write_to<W>(&self, sink: W) -> Result<(W, BackupReport)>
    where
        W: Write + Seek + Send + 'static,
    {
        let start = Instant::now();
        let run_id = self
            .config
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        info!(
            "Starting backup: database={}, run={}",
            self.documents.database_name(),
            run_id
        );

        let mut report = BackupReport {
            run_id,
            collections: 0,
            documents: 0,
            objects: 0,
            object_bytes: 0,
            archive_bytes: 0,
            duration: Duration::ZERO,
        };

        let (queue, writer) = sink::spawn(sink, self.config.compression_level);
        let produced = self.produce(&queue, &mut report).await;
        drop(queue);
        if produced.is_ok() {
            info!("Stage 4/4: Closing archive");
        }

        // A failed writer closes its channels, so its error explains the producer's
        let (sink, entries) = writer.join().await?;
        produced?;

        report.duration = start.elapsed();
        info!(
            "Backup complete: collections={}, documents={}, objects={}, entries={}, duration={:?}",
            report.collections, report.documents, report.objects, entries, report.duration
        );

        Ok((sink, report))
    }

    async fn produce(&self, queue: &ArchiveSink, report: &mut BackupReport) -> Result<()> {
        let run_id = report.run_id.clone();
        let encrypted = self.documents.encryption_at_rest();
        let level = self.config.compression_level;
        let mut manifest = DumpManifest::new(self.documents.database_name(), &run_id, encrypted);

        // Stage 1: Collections
        info!("Stage 1/4: Dumping {} collections", Collection::ALL.len());
        let dumper = CollectionDumper::new(self.documents, self.config.batch_size);
        for collection in Collection::ALL {
            let dump = dumper.dump(collection).await?;
            queue
                .write_bytes(
                    archive::structure_entry(collection, &run_id),
                    EntryCompression::Deflated,
                    dump.structure,
                )
                .await?;

            let data = queue
                .begin(
                    archive::data_entry(collection, &run_id),
                    EntryCompression::Stored,
                    BodyEncoding::GzipLines(level),
                )
                .await?;
            let stats = match forward_pages(dump.pages, &data).await {
                Ok(stats) => stats,
                Err(e) => {
                    dumper.discard(collection, &dump.cursor).await;
                    return Err(e);
                }
            };
            debug!(
                "Dumped {}: {} documents, {} bytes uncompressed",
                collection, stats.documents, stats.bytes
            );

            manifest.collections.push(collection);
            report.collections += 1;
            report.documents += stats.documents;
        }

        // Stage 2: Objects
        let mirror = ObjectMirror::new(self.objects);
        let inventory = mirror.inventory().await?;
        info!("Stage 2/4: Mirroring {} objects", inventory.len());
        for object in &inventory {
            let entry = queue
                .begin(
                    object.entry_name(),
                    EntryCompression::Deflated,
                    BodyEncoding::Raw,
                )
                .await?;
            let copied = entry.send_all(mirror.chunks(object).await?).await?;
            debug!("Mirrored {}/{} ({} bytes)", object.bucket, object.key, copied);

            report.objects += 1;
            report.object_bytes += copied;
        }
        manifest.objects = report.objects;

        // Stage 3: Markers
        info!("Stage 3/4: Writing encryption marker and manifest");
        queue
            .write_bytes(
                archive::ENCRYPTION_ENTRY,
                EntryCompression::Deflated,
                EncryptionMarker::from_flag(encrypted).as_str().to_string(),
            )
            .await?;
        queue
            .write_bytes(
                archive::MANIFEST_ENTRY,
                EntryCompression::Deflated,
                manifest.to_json()?,
            )
            .await?;

        Ok(())
    }
}

/// Encodes each page as JSON lines and forwards it to the data entry.
async fn forward_pages(mut pages: PageStream<'_>, entry: &EntrySender) -> Result<DataStats> {
    let mut stats = DataStats::default();
    while let Some(page) = pages.try_next().await? {
        let lines = dumper::encode_lines(&page)?;
        stats.documents += page.len();
        stats.bytes += lines.len() as u64;
        entry.send(Bytes::from(lines)).await?;
    }
    Ok(stats)
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, ArchiveReader};
    use crate::store::{bytes_body, MemoryDocumentStore, MemoryObjectStore};
    use serde_json::json;
    use std::io::{Cursor, Read};

    #[tokio::test]
    async fn test_archive_layout_order() {
        let documents = MemoryDocumentStore::default();
        let objects = MemoryObjectStore::new();
        objects.create_bucket("catalyst-1").await.unwrap();
        objects
            .put_object("catalyst-1", "a.txt", bytes_body("a"))
            .await
            .unwrap();

        let manager = BackupManager::new(
            &documents,
            &objects,
            BackupConfig::default().with_run_id("run"),
        );
        let (sink, report) = manager.write_to(Cursor::new(Vec::new())).await.unwrap();
        assert_eq!(report.run_id, "run");
        assert_eq!(report.collections, 11);

        let reader = ArchiveReader::open(Cursor::new(sink.into_inner())).unwrap();
        let names = reader.names();
        assert_eq!(names.len(), 11 * 2 + 1 + 2);
        assert_eq!(names[0], "arango/automations_run.structure.json");
        assert_eq!(names[1], "arango/automations_run.data.json.gz");
        assert_eq!(names[21], "arango/users_run.data.json.gz");
        assert_eq!(names[22], "minio/catalyst-1/a.txt");
        assert_eq!(names[23], "arango/ENCRYPTION");
        assert_eq!(names[24], "arango/dump.json");
    }

    #[tokio::test]
    async fn test_generated_run_id_is_shared_by_all_pairs() {
        let documents = MemoryDocumentStore::default();
        let objects = MemoryObjectStore::new();
        let manager = BackupManager::new(&documents, &objects, BackupConfig::default());

        let (sink, report) = manager.write_to(Cursor::new(Vec::new())).await.unwrap();
        assert_eq!(report.run_id.len(), 32);

        let reader = ArchiveReader::open(Cursor::new(sink.into_inner())).unwrap();
        for name in reader.names() {
            match ArchiveEntry::parse(&name) {
                ArchiveEntry::Structure { suffix, .. } | ArchiveEntry::Data { suffix, .. } => {
                    assert_eq!(suffix, report.run_id)
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_create_spools_and_rewinds() {
        let documents = MemoryDocumentStore::default().with_encryption(true);
        documents
            .insert_documents(Collection::Tickets, vec![json!({"_key": "1", "name": "x"})])
            .await
            .unwrap();
        let objects = MemoryObjectStore::new();

        let manager = BackupManager::new(&documents, &objects, BackupConfig::default());
        let archive = manager.create().await.unwrap();
        assert_eq!(archive.report.documents, 1);
        let size = archive.size();
        assert!(size > 0);

        let mut bytes = Vec::new();
        archive.into_file().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, size);

        let mut reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_entry("arango/ENCRYPTION").unwrap(), b"aes-256-ctr");
        let manifest =
            DumpManifest::from_json(&reader.read_entry("arango/dump.json").unwrap()).unwrap();
        assert!(manifest.encrypted);
        assert_eq!(manifest.collections, Collection::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_failed_dump_aborts() {
        let documents = MemoryDocumentStore::default();
        documents.fail_exports(Collection::Playbooks).await;
        let objects = MemoryObjectStore::new();

        let manager = BackupManager::new(&documents, &objects, BackupConfig::default());
        let err = manager.create().await.unwrap_err();
        assert_eq!(err.code(), "store_failure");
        assert!(err.to_string().contains("playbooks"));
    }

    #[test]
    fn test_report_serializes_duration_as_seconds() {
        let report = BackupReport {
            run_id: "r".into(),
            collections: 11,
            documents: 2,
            objects: 1,
            object_bytes: 9,
            archive_bytes: 100,
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["runId"], "r");
        assert_eq!(json["duration"], 1.5);
        assert_eq!(json["objectBytes"], 9);
    }
}

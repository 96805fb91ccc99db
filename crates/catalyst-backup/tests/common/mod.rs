//! Common test infrastructure for catalyst-backup tests
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use catalyst_backup::{
    bytes_body, ArchiveWriter, BackupArchive, BackupConfig, BackupManager, Collection,
    DocumentStore, EntryCompression, MemoryDocumentStore, MemoryObjectStore, ObjectStore,
};
use serde_json::{json, Value};
use std::io::{Cursor, Read};

pub const TEST_BUCKET: &str = "catalyst-8125";
pub const TEST_OBJECT_KEY: &str = "test.txt";
pub const TEST_OBJECT_CONTENT: &str = "test text";
pub const TEST_TICKET_KEY: &str = "8125";
pub const TEST_TICKET_NAME: &str = "phishing from selenafadel@von.com detected";

/// The populated environment used by the end-to-end scenarios.
pub struct Environment {
    pub documents: MemoryDocumentStore,
    pub objects: MemoryObjectStore,
}

impl Environment {
    pub fn empty() -> Self {
        Self {
            documents: MemoryDocumentStore::default(),
            objects: MemoryObjectStore::new(),
        }
    }

    /// One ticket plus one object, as in the classic backup scenario.
    pub async fn scenario() -> Self {
        let env = Self::empty();
        env.objects.create_bucket(TEST_BUCKET).await.unwrap();
        env.objects
            .put_object(TEST_BUCKET, TEST_OBJECT_KEY, bytes_body(TEST_OBJECT_CONTENT))
            .await
            .unwrap();
        env.documents
            .insert_documents(Collection::Tickets, vec![ticket(TEST_TICKET_KEY, TEST_TICKET_NAME)])
            .await
            .unwrap();
        env
    }

    pub async fn backup(&self) -> BackupArchive {
        self.backup_with(BackupConfig::default()).await
    }

    pub async fn backup_with(&self, config: BackupConfig) -> BackupArchive {
        BackupManager::new(&self.documents, &self.objects, config)
            .create()
            .await
            .unwrap()
    }

    /// Truncates every collection and deletes every bucket.
    pub async fn wipe(&self) {
        for collection in Collection::ALL {
            self.documents.truncate(collection).await.unwrap();
        }
        for bucket in self.objects.list_buckets().await.unwrap() {
            self.objects.delete_bucket(&bucket).await.unwrap();
        }
    }
}

pub fn ticket(key: &str, name: &str) -> Value {
    json!({
        "_key": key,
        "name": name,
        "type": "alert",
        "status": "open",
        "owner": "demo",
    })
}

pub fn archive_bytes(archive: BackupArchive) -> Vec<u8> {
    let mut bytes = Vec::new();
    archive.into_file().read_to_end(&mut bytes).unwrap();
    bytes
}

/// Builds an archive from raw `(name, body)` entries.
pub fn raw_archive(entries: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), 6);
    for (name, body) in entries {
        writer
            .write_bytes(name, EntryCompression::Deflated, body)
            .unwrap();
    }
    let mut sink = writer.close().unwrap();
    sink.set_position(0);
    sink
}

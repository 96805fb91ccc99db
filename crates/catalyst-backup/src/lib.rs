//! Catalyst Backup System
//!
//! This crate captures the complete state of a Catalyst deployment, its document
//! database collections and its object storage buckets, into a single ZIP archive
//! and reconstructs that state from such an archive.
//!
//! # Features
//!
//! ## Backup
//! - **Closed collection set**: every known collection travels as a structure/data pair
//! - **Streaming dumps**: documents are paged through export cursors into gzip JSON lines
//! - **Object mirroring**: every bucket and object copied byte for byte
//! - **Spooled output**: the archive is handed out only once it closed successfully
//! - **Off-runtime encoding**: ZIP and gzip writes run on a blocking writer thread
//!
//! ## Restore
//! - **Validation first**: the archive index is checked before any store is touched
//! - **Ordered replay**: truncate, objects, then structure and documents per collection
//! - **Bounded memory**: entries are decoded on a blocking thread behind bounded channels
//!
//! # Examples
//!
//! ```no_run
//! use catalyst_backup::{
//!     BackupConfig, BackupManager, MemoryDocumentStore, MemoryObjectStore, RestoreManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let documents = MemoryDocumentStore::default();
//!     let objects = MemoryObjectStore::new();
//!
//!     let archive = BackupManager::new(&documents, &objects, BackupConfig::default())
//!         .create()
//!         .await?;
//!     println!("Backup created: {} bytes", archive.size());
//!
//!     let report = RestoreManager::new(&documents, &objects)
//!         .restore(archive.into_file())
//!         .await?;
//!     println!("Restored {} documents", report.documents);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod backup;
pub mod collection;
pub mod dumper;
pub mod error;
pub mod manifest;
pub mod mirror;
pub mod restore;
pub mod store;
pub mod structure;

// Re-export commonly used types
pub use archive::{ArchiveReader, ArchiveWriter, EntryCompression, DEFAULT_COMPRESSION_LEVEL};
pub use backup::{BackupArchive, BackupConfig, BackupManager, BackupReport};
pub use collection::{Collection, CollectionKind};
pub use dumper::{CollectionDumper, DataStats};
pub use error::{Error, ErrorKind, Result};
pub use manifest::{DumpManifest, EncryptionMarker, MANIFEST_VERSION};
pub use mirror::{ObjectMirror, ObjectRef};
pub use restore::{RestoreManager, RestorePlan, RestoreReport};
pub use store::{
    bytes_body, ByteStream, DocumentBatch, DocumentStore, MemoryDocumentStore,
    MemoryObjectStore, ObjectStore, DEFAULT_BATCH_SIZE,
};
pub use structure::{CollectionStructure, IndexDefinition};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

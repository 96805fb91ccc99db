//! Random-access archive reader.

use std::io::{Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

use super::{pair_collection_entries, CollectionEntries};
use crate::collection::Collection;
use crate::error::{Error, Result};

/// Metadata of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub name: String,

    /// Uncompressed size in bytes
    pub size: u64,

    pub compressed_size: u64,

    pub is_dir: bool,
}

/// Reader over a backup archive.
///
/// Opening parses only the central directory; entry bodies are decompressed
/// when opened, so unrelated entries are never touched.
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Parses the archive index. Fails with `CorruptArchive` if it cannot be read.
    pub fn open(source: R) -> Result<Self> {
        let zip = ZipArchive::new(source)
            .map_err(|e| Error::corrupt_archive(format!("cannot read archive index: {}", e)))?;
        Ok(Self { zip })
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zip.file_names().any(|n| n == name)
    }

    /// Entry names in archive order.
    pub fn names(&self) -> Vec<String> {
        self.zip.file_names().map(str::to_string).collect()
    }

    /// Entries whose name starts with `prefix`, in archive order.
    pub fn list_entries(&mut self, prefix: &str) -> Result<Vec<EntryDescriptor>> {
        let mut entries = Vec::new();
        for index in 0..self.zip.len() {
            let file = self.zip.by_index(index).map_err(corrupt)?;
            if !file.name().starts_with(prefix) {
                continue;
            }
            entries.push(EntryDescriptor {
                name: file.name().to_string(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    /// Opens the decompressed body of the entry called exactly `name`.
    pub fn open_entry(&mut self, name: &str) -> Result<impl Read + '_> {
        self.zip.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => {
                Error::corrupt_archive(format!("entry {} not found in archive", name))
            }
            other => corrupt(other),
        })
    }

    /// Reads a whole entry into memory; meant for small metadata entries.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.open_entry(name)?
            .read_to_end(&mut body)
            .map_err(|e| Error::corrupt_data(name, e))?;
        Ok(body)
    }

    /// Locates the structure/data pair of `collection` by name pattern.
    pub fn collection_entries(&self, collection: Collection) -> Result<Option<CollectionEntries>> {
        pair_collection_entries(self.zip.file_names(), collection)
    }
}

fn corrupt(err: ZipError) -> Error {
    Error::corrupt_archive(err.to_string())
}

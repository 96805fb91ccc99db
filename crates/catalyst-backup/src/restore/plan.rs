//! Restore plan derived from the archive index.
//!
//! Everything that can be checked without touching a store is checked here,
//! before the first collection is truncated.

use std::io::{Read, Seek};
use tracing::{debug, warn};

use crate::archive::{
    pair_collection_entries, ArchiveEntry, ArchiveReader, CollectionEntries, ENCRYPTION_ENTRY,
    MANIFEST_ENTRY,
};
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::manifest::{DumpManifest, EncryptionMarker};
use crate::structure::CollectionStructure;

/// One object to recreate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub bucket: String,
    pub key: String,

    /// Archive entry holding the body
    pub entry: String,
}

/// One collection to recreate.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRestore {
    pub collection: Collection,
    pub entries: CollectionEntries,

    /// Parsed structure entry
    pub structure: CollectionStructure,
}

/// Validated description of what a restore will do.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    /// Collections present in the archive, in fixed enumeration order
    pub collections: Vec<CollectionRestore>,

    /// Objects in archive order
    pub objects: Vec<ObjectEntry>,

    pub encryption: EncryptionMarker,

    /// Dump manifest, when present and readable
    pub manifest: Option<DumpManifest>,

    /// Entries ignored by the restore
    pub skipped: Vec<String>,
}

impl RestorePlan {
    /// Inspects the archive index and the small metadata entries.
    pub fn build<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<Self> {
        let names = reader.names();
        if !names.iter().any(|name| name == ENCRYPTION_ENTRY) {
            return Err(Error::corrupt_archive(format!(
                "{} marker missing, not a backup archive",
                ENCRYPTION_ENTRY
            )));
        }

        let mut objects = Vec::new();
        let mut skipped = Vec::new();
        for name in &names {
            if name.ends_with('/') {
                warn!("Skipping directory entry {}", name);
                skipped.push(name.clone());
                continue;
            }

            match ArchiveEntry::parse(name) {
                ArchiveEntry::Structure { collection, .. } | ArchiveEntry::Data { collection, .. } => {
                    if Collection::from_name(&collection).is_none() {
                        return Err(Error::unknown_collection(collection));
                    }
                }
                ArchiveEntry::Object { bucket, key } => objects.push(ObjectEntry {
                    bucket,
                    key,
                    entry: name.clone(),
                }),
                ArchiveEntry::EncryptionMarker | ArchiveEntry::Manifest => {}
                ArchiveEntry::Unrecognized => {
                    warn!("Skipping unrecognized entry {}", name);
                    skipped.push(name.clone());
                }
            }
        }

        let mut collections = Vec::new();
        for collection in Collection::ALL {
            match pair_collection_entries(names.iter().map(String::as_str), collection)? {
                Some(entries) => {
                    let structure = read_structure(reader, collection, &entries.structure)?;
                    collections.push(CollectionRestore {
                        collection,
                        entries,
                        structure,
                    });
                }
                None => debug!("Collection {} absent from archive, left empty", collection),
            }
        }

        let encryption = EncryptionMarker::parse(&reader.read_entry(ENCRYPTION_ENTRY)?);
        if let EncryptionMarker::Other(value) = &encryption {
            warn!("Unrecognized encryption marker content: {}", value);
        }

        Ok(Self {
            collections,
            objects,
            encryption,
            manifest: read_manifest(reader),
            skipped,
        })
    }
}

fn read_structure<R: Read + Seek>(
    reader: &mut ArchiveReader<R>,
    collection: Collection,
    entry: &str,
) -> Result<CollectionStructure> {
    let structure = CollectionStructure::from_json(&reader.read_entry(entry)?)
        .map_err(|e| Error::corrupt_data(entry, e))?;
    if structure.parameters.name != collection.name() {
        return Err(Error::corrupt_data(
            entry,
            format!("describes collection {}", structure.parameters.name),
        ));
    }
    Ok(structure)
}

fn read_manifest<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Option<DumpManifest> {
    if !reader.contains(MANIFEST_ENTRY) {
        debug!("Archive has no {}", MANIFEST_ENTRY);
        return None;
    }

    let parsed = reader
        .read_entry(MANIFEST_ENTRY)
        .and_then(|bytes| DumpManifest::from_json(&bytes).map_err(Error::from));
    match parsed {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", MANIFEST_ENTRY, e);
            None
        }
    }
}

//! Backup archive layout.
//!
//! A backup is a ZIP container with two top-level namespaces:
//!
//! ```text
//! arango/ENCRYPTION                              encryption-at-rest marker
//! arango/dump.json                               dump manifest
//! arango/<collection>_<run>.structure.json       one per known collection
//! arango/<collection>_<run>.data.json.gz         one per known collection
//! minio/<bucket>/<key>                           one per stored object
//! ```
//!
//! `<run>` is an opaque per-backup suffix shared by every structure/data pair
//! written in the same run. Readers pair entries by equal suffix and never infer
//! ordering from it.
//!
//! ZIP tools treat a name ending in `/` as a directory, so object keys are escaped:
//! `%` becomes `%25` and a trailing `/` becomes `%2F`. Every other key is stored
//! verbatim.

use crate::collection::Collection;
use crate::error::{Error, Result};

pub mod reader;
pub mod writer;

pub use reader::{ArchiveReader, EntryDescriptor};
pub use writer::{ArchiveWriter, EntryCompression, EntryWriter, DEFAULT_COMPRESSION_LEVEL};

/// Namespace of database dump entries
pub const ARANGO_PREFIX: &str = "arango/";

/// Namespace of object storage entries
pub const MINIO_PREFIX: &str = "minio/";

/// Encryption-at-rest marker entry
pub const ENCRYPTION_ENTRY: &str = "arango/ENCRYPTION";

/// Dump manifest entry
pub const MANIFEST_ENTRY: &str = "arango/dump.json";

const STRUCTURE_EXTENSION: &str = ".structure.json";
const DATA_EXTENSION: &str = ".data.json.gz";

/// Name of the structure entry of `collection` for run `suffix`.
pub fn structure_entry(collection: Collection, suffix: &str) -> String {
    format!(
        "{}{}_{}{}",
        ARANGO_PREFIX,
        collection.name(),
        suffix,
        STRUCTURE_EXTENSION
    )
}

/// Name of the data entry of `collection` for run `suffix`.
pub fn data_entry(collection: Collection, suffix: &str) -> String {
    format!(
        "{}{}_{}{}",
        ARANGO_PREFIX,
        collection.name(),
        suffix,
        DATA_EXTENSION
    )
}

/// Name of the entry holding object `key` of `bucket`.
pub fn object_entry(bucket: &str, key: &str) -> String {
    format!("{}{}/{}", MINIO_PREFIX, bucket, encode_object_key(key))
}

const ESCAPED_PERCENT: &str = "%25";
const ESCAPED_SLASH: &str = "%2F";

fn encode_object_key(key: &str) -> String {
    let escaped = key.replace('%', ESCAPED_PERCENT);
    match escaped.strip_suffix('/') {
        Some(stem) => format!("{}{}", stem, ESCAPED_SLASH),
        None => escaped,
    }
}

// Lenient: a `%` that starts no known escape is kept as is.
fn decode_object_key(entry_key: &str) -> String {
    let mut key = String::with_capacity(entry_key.len());
    let mut rest = entry_key;

    while let Some(at) = rest.find('%') {
        key.push_str(&rest[..at]);
        rest = &rest[at..];
        if rest == ESCAPED_SLASH {
            key.push('/');
            return key;
        }
        if rest.starts_with(ESCAPED_PERCENT) {
            key.push('%');
            rest = &rest[ESCAPED_PERCENT.len()..];
        } else {
            key.push('%');
            rest = &rest[1..];
        }
    }

    key.push_str(rest);
    key
}

/// Classification of an archive entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    EncryptionMarker,
    Manifest,
    Structure { collection: String, suffix: String },
    Data { collection: String, suffix: String },
    Object { bucket: String, key: String },
    Unrecognized,
}

impl ArchiveEntry {
    pub fn parse(name: &str) -> ArchiveEntry {
        if name == ENCRYPTION_ENTRY {
            return ArchiveEntry::EncryptionMarker;
        }
        if name == MANIFEST_ENTRY {
            return ArchiveEntry::Manifest;
        }

        if let Some(rest) = name.strip_prefix(MINIO_PREFIX) {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    ArchiveEntry::Object {
                        bucket: bucket.to_string(),
                        key: decode_object_key(key),
                    }
                }
                _ => ArchiveEntry::Unrecognized,
            };
        }

        let Some(rest) = name.strip_prefix(ARANGO_PREFIX) else {
            return ArchiveEntry::Unrecognized;
        };
        if rest.contains('/') {
            return ArchiveEntry::Unrecognized;
        }

        if let Some(stem) = rest.strip_suffix(STRUCTURE_EXTENSION) {
            let (collection, suffix) = split_stem(stem);
            if !collection.is_empty() {
                return ArchiveEntry::Structure { collection, suffix };
            }
        } else if let Some(stem) = rest.strip_suffix(DATA_EXTENSION) {
            let (collection, suffix) = split_stem(stem);
            if !collection.is_empty() {
                return ArchiveEntry::Data { collection, suffix };
            }
        }

        ArchiveEntry::Unrecognized
    }
}

// Collection names never contain '_', so the first one separates the run suffix.
fn split_stem(stem: &str) -> (String, String) {
    match stem.split_once('_') {
        Some((collection, suffix)) => (collection.to_string(), suffix.to_string()),
        None => (stem.to_string(), String::new()),
    }
}

/// Structure and data entry names of one collection dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntries {
    pub structure: String,
    pub data: String,
}

/// Locates the dump pair of `collection` among `names`.
///
/// Returns `None` when the collection is absent altogether. A lone structure or
/// data entry, duplicates, or a pair with differing suffixes is an error.
pub fn pair_collection_entries<'a>(
    names: impl IntoIterator<Item = &'a str>,
    collection: Collection,
) -> Result<Option<CollectionEntries>> {
    let mut structures = Vec::new();
    let mut data = Vec::new();

    for name in names {
        match ArchiveEntry::parse(name) {
            ArchiveEntry::Structure {
                collection: c,
                suffix,
            } if c == collection.name() => structures.push((name, suffix)),
            ArchiveEntry::Data {
                collection: c,
                suffix,
            } if c == collection.name() => data.push((name, suffix)),
            _ => {}
        }
    }

    match (structures.as_slice(), data.as_slice()) {
        ([], []) => Ok(None),
        ([(structure, structure_suffix)], [(data, data_suffix)]) => {
            if structure_suffix != data_suffix {
                return Err(Error::missing_dump(
                    collection.name(),
                    format!("structure {} and data {} belong to different runs", structure, data),
                ));
            }
            Ok(Some(CollectionEntries {
                structure: structure.to_string(),
                data: data.to_string(),
            }))
        }
        (_, []) => Err(Error::missing_dump(
            collection.name(),
            "structure entry without data entry",
        )),
        ([], _) => Err(Error::missing_dump(
            collection.name(),
            "data entry without structure entry",
        )),
        _ => Err(Error::missing_dump(
            collection.name(),
            format!(
                "{} structure and {} data entries, expected exactly one pair",
                structures.len(),
                data.len()
            ),
        )),
    }
}

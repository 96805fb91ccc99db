//! Dump manifest and encryption marker.
//!
//! The manifest (`arango/dump.json`) records where and when a backup was taken.
//! Restore reads it for reporting only and tolerates its absence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collection::Collection;

/// Version of the dump manifest format.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Metadata stored alongside the collection dumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpManifest {
    /// Manifest format version
    pub version: String,

    /// Database the collections were dumped from
    pub database: String,

    /// When the backup was started
    pub created_at: DateTime<Utc>,

    /// What created this backup (e.g., "catalyst-backup v0.1.0")
    pub created_by: String,

    /// Suffix shared by every structure/data pair of this run
    pub run_id: String,

    /// Collections dumped, in backup order
    pub collections: Vec<Collection>,

    /// Number of objects mirrored from object storage
    pub objects: usize,

    /// Whether the source database encrypted data at rest
    pub encrypted: bool,
}

impl DumpManifest {
    pub fn new(database: impl Into<String>, run_id: impl Into<String>, encrypted: bool) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            database: database.into(),
            created_at: Utc::now(),
            created_by: format!("catalyst-backup v{}", crate::VERSION),
            run_id: run_id.into(),
            collections: Vec::new(),
            objects: 0,
            encrypted,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Content of the `arango/ENCRYPTION` marker entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionMarker {
    /// Source database stored data unencrypted
    None,

    /// Source database used encryption at rest
    Encrypted,

    /// Marker present with content this crate does not recognise
    Other(String),
}

impl EncryptionMarker {
    pub fn from_flag(encrypted: bool) -> Self {
        if encrypted {
            EncryptionMarker::Encrypted
        } else {
            EncryptionMarker::None
        }
    }

    pub fn parse(content: &[u8]) -> Self {
        match String::from_utf8_lossy(content).trim() {
            "none" | "" => EncryptionMarker::None,
            "aes-256-ctr" => EncryptionMarker::Encrypted,
            other => EncryptionMarker::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EncryptionMarker::None => "none",
            EncryptionMarker::Encrypted => "aes-256-ctr",
            EncryptionMarker::Other(s) => s,
        }
    }
}

impl fmt::Display for EncryptionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

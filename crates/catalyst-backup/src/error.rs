//! Error types for backup and restore operations

use thiserror::Error;

/// Result type alias using catalyst-backup's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed collaborator error carried by [`Error::StoreFailure`]
pub type StoreSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad classification used to tell bad input apart from internal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied something unusable; retrying with the same input fails again
    BadInput,

    /// A store, the filesystem or the archive encoder failed; an operator may retry
    Internal,
}

/// Errors surfaced by backup and restore operations
#[derive(Error, Debug)]
pub enum Error {
    /// Multipart payload missing or malformed
    #[error("Invalid upload: {message}")]
    InvalidUpload { message: String },

    /// Archive index unreadable or not a backup archive
    #[error("Corrupt archive: {message}")]
    CorruptArchive { message: String },

    /// Structure/data pair mismatch for a known collection
    #[error("Incomplete dump for collection {collection}: {reason}")]
    MissingCollectionDump { collection: String, reason: String },

    /// Archived collection name that is not part of the known set
    #[error("Unknown collection in archive: {name}")]
    UnknownCollection { name: String },

    /// Database or object storage operation failed
    #[error("Store operation failed ({operation}): {source}")]
    StoreFailure {
        operation: String,
        #[source]
        source: StoreSource,
    },

    /// Decompression or JSON parse failure inside an archive entry
    #[error("Corrupt data in {entry}: {message}")]
    CorruptDataStream { entry: String, message: String },

    /// Archive encoder failure while writing a backup
    #[error("Archive write error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid upload error
    pub fn invalid_upload(message: impl Into<String>) -> Self {
        Self::InvalidUpload {
            message: message.into(),
        }
    }

    /// Create a corrupt archive error
    pub fn corrupt_archive(message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            message: message.into(),
        }
    }

    /// Create a missing collection dump error
    pub fn missing_dump(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingCollectionDump {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown collection error
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Wrap a collaborator failure
    pub fn store(operation: impl Into<String>, source: anyhow::Error) -> Self {
        Self::StoreFailure {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a corrupt data stream error
    pub fn corrupt_data(entry: impl Into<String>, message: impl ToString) -> Self {
        Self::CorruptDataStream {
            entry: entry.into(),
            message: message.to_string(),
        }
    }

    /// Classify the error for callers deciding whether a retry makes sense.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUpload { .. }
            | Self::CorruptArchive { .. }
            | Self::MissingCollectionDump { .. }
            | Self::UnknownCollection { .. }
            | Self::CorruptDataStream { .. } => ErrorKind::BadInput,
            Self::StoreFailure { .. } | Self::Archive(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable machine-readable name of the error variant
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUpload { .. } => "invalid_upload",
            Self::CorruptArchive { .. } => "corrupt_archive",
            Self::MissingCollectionDump { .. } => "missing_collection_dump",
            Self::UnknownCollection { .. } => "unknown_collection",
            Self::StoreFailure { .. } => "store_failure",
            Self::CorruptDataStream { .. } => "corrupt_data_stream",
            Self::Archive(_) => "archive_write",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Maps a panicked or cancelled blocking task to an IO error.
pub(crate) fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(err))
}

//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] shoplist_codec::CodecError),

    /// The log file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A record failed its checksum.
    #[error("checksum mismatch at offset {offset}: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the damaged record.
        offset: u64,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// Another process holds the store's lock.
    #[error("store locked: {} is in use by another process", path.display())]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// A key or value exceeds the record format limits.
    #[error("record too large: {size} bytes")]
    RecordTooLarge {
        /// Size of the rejected key or value.
        size: usize,
    },
}

impl StorageError {
    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

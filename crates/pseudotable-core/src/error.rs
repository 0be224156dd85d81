//! Error types for pseudotable operations
//!
//! Every failure is scoped to the single call that produced it. Remote
//! failures are surfaced as-is; nothing in this crate retries.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Pseudotable error types with detailed context
#[derive(Debug, Clone, Error)]
pub enum TableError {
    /// Reverse lookup found no record carrying the identifier
    #[error("no mapping in table {table} for identifier {identifier}")]
    NotFound {
        /// Table that was searched
        table: String,
        /// Identifier that was looked up
        identifier: String,
    },

    /// Caller supplied a value the table cannot accept
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument
        reason: String,
    },

    /// The backing store failed or was unreachable
    #[error("store {operation} failed for {path}: {message}")]
    Store {
        /// Store operation (get, set, commit, ...)
        operation: &'static str,
        /// Document or collection path involved
        path: String,
        /// Description reported by the store
        message: String,
    },

    /// A create-if-absent precondition found an existing document
    #[error("document {path} already exists")]
    Conflict {
        /// Path of the existing document
        path: String,
    },

    /// A chunked write failed part-way through
    ///
    /// Records committed before the failure stay valid. Re-running the
    /// request with `unconfirmed` is safe: every key is re-checked first.
    #[error(
        "batch write to table {table} stopped after {committed} records were committed, {} unconfirmed: {source}",
        .unconfirmed.len()
    )]
    PartialWrite {
        /// Table being written
        table: String,
        /// Records durably committed before the failure
        committed: usize,
        /// Data whose records are not confirmed written
        unconfirmed: Vec<String>,
        /// The failure that stopped the write
        #[source]
        source: Box<TableError>,
    },

    /// Stored state violates a table invariant
    #[error("table {table} is inconsistent: {reason}")]
    Corrupted {
        /// Table holding the inconsistent records
        table: String,
        /// What invariant is broken
        reason: String,
    },

    /// I/O operation failed
    #[error("I/O error{}: {message} ({kind})", in_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Commit log frame is structurally invalid
    #[error("commit log corrupted in {} at offset {offset}: {reason}", .path.display())]
    LogCorrupted {
        /// Log file holding the frame
        path: PathBuf,
        /// Byte offset where corruption was detected
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// Checksum verification failed
    #[error(
        "checksum mismatch in {} at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}",
        .path.display()
    )]
    ChecksumMismatch {
        /// File where checksum failed
        path: PathBuf,
        /// Expected checksum value
        expected: u32,
        /// Actual checksum computed
        actual: u32,
        /// Byte offset of the corrupted data
        offset: u64,
    },

    /// Partial frame at the end of a log file
    #[error(
        "torn write in {} at offset {offset}: expected {expected_size} bytes, only {available_bytes} available",
        .path.display()
    )]
    TornWrite {
        /// File with torn write
        path: PathBuf,
        /// Expected payload size
        expected_size: u32,
        /// Actual bytes available
        available_bytes: u64,
        /// Offset where torn write begins
        offset: u64,
    },

    /// Magic bytes not found at expected location
    #[error(
        "magic bytes not found in {} at offset {offset}: found {:02x}{:02x}{:02x}{:02x}",
        .path.display(), .found_bytes[0], .found_bytes[1], .found_bytes[2], .found_bytes[3]
    )]
    NoMagicFound {
        /// File being read
        path: PathBuf,
        /// Offset where magic was expected
        offset: u64,
        /// Bytes actually found
        found_bytes: [u8; 4],
    },

    /// Another `LocalStore` holds the directory lock
    #[error("store directory {} is locked by another process", .path.display())]
    StoreLocked {
        /// Lock file that could not be acquired
        path: PathBuf,
    },

    /// A single commit exceeds the frame size limit
    #[error("commit of {size} bytes exceeds limit of {max} bytes")]
    OversizedCommit {
        /// Encoded commit size
        size: u64,
        /// Maximum frame payload
        max: u64,
    },

    /// JSON encoding or decoding failed
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description from the encoder
        message: String,
    },
}

fn in_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl TableError {
    /// Shorthand for [`TableError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        TableError::InvalidArgument { reason: reason.into() }
    }

    /// Wrap an I/O error with the file it concerns.
    pub fn io_at(path: &Path, context: &str, err: std::io::Error) -> Self {
        TableError::Io {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("{}: {}", context, err),
        }
    }

    /// True when the error is a create-if-absent precondition failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TableError::Conflict { .. })
    }
}

impl From<std::io::Error> for TableError {
    fn from(err: std::io::Error) -> Self {
        TableError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        TableError::Serialization { message: err.to_string() }
    }
}

/// Result type alias for pseudotable operations
pub type TableResult<T> = Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TableError::ChecksumMismatch {
            path: PathBuf::from("/tmp/commits.log"),
            expected: 0x12345678,
            actual: 0x87654321,
            offset: 1024,
        };

        let display = err.to_string();
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("0x12345678"));
        assert!(display.contains("0x87654321"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TableError = io_err.into();

        match err {
            TableError::Io { kind, path, .. } => {
                assert_eq!(kind, std::io::ErrorKind::NotFound);
                assert!(path.is_none());
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_partial_write_reports_unconfirmed_count() {
        let err = TableError::PartialWrite {
            table: "phone-test".into(),
            committed: 500,
            unconfirmed: vec!["a".into(), "b".into()],
            source: Box::new(TableError::Store {
                operation: "commit",
                path: "tables/phone-test/mappings".into(),
                message: "unavailable".into(),
            }),
        };
        let display = err.to_string();
        assert!(display.contains("500 records"));
        assert!(display.contains("2 unconfirmed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

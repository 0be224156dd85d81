//! Firestore adapter errors

use std::path::PathBuf;

use pseudotable_core::TableError;
use thiserror::Error;

/// Failures talking to Firestore or preparing a connection.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// Service-account key could not be loaded
    #[error("credentials error{}: {reason}", in_file(.path))]
    Credentials {
        /// Key file, when loaded from disk
        path: Option<PathBuf>,
        /// What went wrong
        reason: String,
    },

    /// Connection settings are unusable
    #[error("invalid firestore config: {0}")]
    Config(String),

    /// Firestore answered with a non-success status
    #[error("firestore {operation} on {path} returned http {status}: {message}")]
    Status {
        /// Store operation
        operation: &'static str,
        /// Document or collection involved
        path: String,
        /// HTTP status code
        status: u16,
        /// Response body, usually a JSON error object
        message: String,
    },

    /// The request never got an answer
    #[error("firestore {operation} on {path} failed: {message}")]
    Transport {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// A must-not-exist precondition failed during commit
    #[error("document {path} already exists")]
    AlreadyExists {
        /// First document the commit tried to create
        path: String,
    },

    /// The response body was not what the REST API documents
    #[error("unexpected firestore response to {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

fn in_file(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl FirestoreError {
    /// HTTP 404 from a point read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FirestoreError::Status { status: 404, .. })
    }

    /// True when a commit was rejected because a precondition failed.
    ///
    /// Firestore reports a failed `exists: false` precondition as
    /// `ALREADY_EXISTS` (409); the emulator has been seen to answer with
    /// `FAILED_PRECONDITION` (400) instead.
    pub fn is_precondition_failure(&self) -> bool {
        match self {
            FirestoreError::Status { status: 409, .. } => true,
            FirestoreError::Status { status: 400, message, .. } => {
                message.contains("ALREADY_EXISTS") || message.contains("FAILED_PRECONDITION")
            }
            _ => false,
        }
    }
}

impl From<FirestoreError> for TableError {
    fn from(err: FirestoreError) -> Self {
        match err {
            FirestoreError::AlreadyExists { path } => TableError::Conflict { path },
            FirestoreError::Credentials { .. } | FirestoreError::Config(_) => {
                TableError::invalid(err.to_string())
            }
            FirestoreError::Status { operation, path, status, message } => TableError::Store {
                operation,
                path,
                message: format!("http {}: {}", status, message),
            },
            FirestoreError::Transport { operation, path, message } => {
                TableError::Store { operation, path, message }
            }
            FirestoreError::Decode { operation, message } => TableError::Store {
                operation,
                path: String::new(),
                message,
            },
        }
    }
}

//! Error types for RecordDB operations
//!
//! The default store surface collapses every failure to a boolean or an
//! absent value. The `try_*` operations return a `RecordError` instead, so
//! callers that want to tell a rejected key from a failed write can.

use std::fmt;
use std::error::Error;
use std::path::PathBuf;

/// RecordDB error types with enough context to log or retry
#[derive(Debug, Clone)]
pub enum RecordError {
    /// Filesystem operation failed
    Io {
        /// The store path involved, when known
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Key rejected before any I/O
    InvalidKey {
        /// Length of the offending key in bytes
        len: usize,
        /// Longest key the record layout accepts
        max: usize,
        /// Why the key was rejected
        reason: &'static str,
    },

    /// Append transferred fewer bytes than one record
    TornWrite {
        /// File that received the partial record
        path: PathBuf,
        /// Size of one full record
        expected_size: usize,
        /// Bytes the filesystem accepted
        written: usize,
    },

    /// Store configuration rejected by `StoreConfig::validate`
    InvalidConfig {
        /// What is wrong with the configuration
        reason: String,
    },
}

impl RecordError {
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error, context: &str) -> Self {
        RecordError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", context, err),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            RecordError::InvalidKey { len, max, reason } => {
                write!(f, "Invalid key ({} bytes, max {}): {}", len, max, reason)
            }

            RecordError::TornWrite { path, expected_size, written } => {
                write!(f, "Torn write in {}: wrote {} of {} record bytes",
                       path.display(), written, expected_size)
            }

            RecordError::InvalidConfig { reason } => {
                write!(f, "Invalid store configuration: {}", reason)
            }
        }
    }
}

impl Error for RecordError {}

/// Result type alias for RecordDB operations
pub type RecordResult<T> = Result<T, RecordError>;

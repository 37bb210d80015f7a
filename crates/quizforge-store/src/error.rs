//! Error types for the store layer.

use std::io;
use std::path::PathBuf;

/// Errors that can occur while reading or writing persisted rooms.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A table file exists but isn't valid JSON for its record type.
    #[error("corrupt table {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A record couldn't be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The background writer is gone (runtime shutting down).
    #[error("persister closed")]
    Closed,

    /// A blocking store call panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

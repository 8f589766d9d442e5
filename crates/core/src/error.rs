//! Unified error types for the feather cache engine.
//!
//! Every variant renders with an upper-case code prefix so hosts can match
//! on the message when they only see the string form.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Unified error type for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file could not be opened, is locked, or is corrupt.
    ///
    /// `reset` is set when the file and its side files were removed and a
    /// fresh store was created before this was raised.
    #[error("OPEN_FAILED: {}: {source}", path.display())]
    OpenFailed { path: PathBuf, source: rusqlite::Error, reset: bool },

    /// The storage backend did not round-trip the validation marker.
    #[error(
        "VALIDATION_FAILED: {reason}; check the SQLite library version ({sqlite_version}) \
         and the construct pragmas ({pragmas})"
    )]
    ValidationFailed { sqlite_version: String, pragmas: String, reason: String },

    /// A prepared or administrative statement failed.
    #[error("STATEMENT_FAILED: {0}")]
    StatementFailed(#[from] rusqlite::Error),

    /// Envelope encoding or decoding failed.
    #[error("ENCODE_FAILED: {0}")]
    Encode(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Options could not be loaded or are invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// The handle was already closed.
    #[error("CACHE_CLOSED")]
    Closed,
}

impl Error {
    /// Whether this error means the store was reset after a failed open.
    pub fn is_reset(&self) -> bool {
        matches!(self, Error::OpenFailed { reset: true, .. })
    }
}

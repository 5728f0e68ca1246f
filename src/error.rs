//! Typed error taxonomy for the journal, executor, validator and detector.
//!
//! Mirrors the reference taxonomy: Input, Precondition, Filesystem, Integrity,
//! Journal, Cancellation. Library code returns `Result<T>`; only the CLI
//! binary converts into `anyhow::Result` at the boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::validator::Conflict;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed path, unknown strategy, unknown operation/transaction id.
    #[error("invalid input: {0}")]
    Input(String),

    /// A validator conflict blocked an undo/redo.
    #[error("precondition failed: {0:?}")]
    Precondition(Vec<Conflict>),

    /// Permission denied, cross-device rename, disk full, missing parent.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Digest mismatch, treated as a precondition conflict by callers that
    /// need the finer distinction for logging.
    #[error("integrity check failed at {path}: expected {expected}, found {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Lock timeout, corruption, schema-too-new.
    #[error("journal error: {0}")]
    Journal(String),

    /// User interrupt / cooperative cancellation.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn journal(msg: impl Into<String>) -> Self {
        Error::Journal(msg.into())
    }

    pub fn cancelled(op: impl Into<String>) -> Self {
        Error::Cancelled(op.into())
    }
}

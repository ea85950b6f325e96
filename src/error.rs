//! Centralized error types for archivist.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ids::{DocId, ThreadId};

/// All errors produced by the archivist library.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The store was written by an incompatible schema version.
    #[error("index is version {stored:?} but this build expects {expected:?}")]
    VersionMismatch { stored: String, expected: String },

    /// A label failed the index token syntax check.
    #[error("{0:?} is an invalid label")]
    InvalidLabel(String),

    /// A query string could not be parsed.
    #[error("cannot parse query {query:?}: {reason}")]
    QueryParse { query: String, reason: String },

    /// No message with this docid has been added.
    #[error("unknown message {0}")]
    UnknownMessage(DocId),

    /// No live thread with this id exists.
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),

    /// The store and the index disagree about an id mapping.
    #[error("corrupt id mapping: {0}")]
    CorruptMapping(String),

    /// A stored record could not be decoded.
    #[error("cannot decode record at '{key}': {reason}")]
    Codec { key: String, reason: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted store or index file is damaged or has the wrong format.
    #[error("invalid store file '{path}': {reason}")]
    InvalidStore { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn codec(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Codec {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    /// True when the caller supplied bad input and may retry with different input.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLabel(_)
                | Self::QueryParse { .. }
                | Self::UnknownMessage(_)
                | Self::UnknownThread(_)
        )
    }

    /// True when the store and index have drifted apart or a record is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptMapping(_) | Self::Codec { .. } | Self::InvalidStore { .. }
        )
    }
}

//! Durable resume state
//!
//! This module owns the two files that make a harvest resumable:
//! - the checkpoint, the highest parent position committed to output
//! - the progress file, the parents still awaiting reply fetch
//!
//! Both are written with atomic replace semantics so a crash never leaves a
//! partially written value behind.

mod atomic;
mod checkpoint;
mod progress;

pub use atomic::{read_optional, write_atomic};
pub use checkpoint::CheckpointStore;
pub use progress::{PassOutcome, ProgressState, ProgressTracker};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing resume state
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt state in {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

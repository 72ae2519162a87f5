//! Sink trait and types
//!
//! This module defines the trait interface for record sinks and the
//! run record they may keep.

use crate::crawler::MergedOutput;
use crate::model::{Parent, Reply};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write output: {0}")]
    Write(#[from] StorageError),

    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt export {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Final status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every parent's replies were written
    Completed,
    /// Finished, but some parents failed and will be retried
    Partial,
    /// Stopped on request
    Stopped,
    /// Halted on a fatal error
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One harvest run, as recorded by sinks that keep history
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: String,
    pub finished_at: String,
    pub config_hash: String,
    pub status: RunStatus,
    pub parents_fetched: u64,
    pub replies_fetched: u64,
    pub failures: u64,
}

/// Destination for exported records
///
/// Every write is durable when it returns: the harvester advances its
/// progress only after a write succeeds. Writes are keyed, so repeating one
/// after a crash does not duplicate records.
pub trait Sink: Send {
    /// Parents already exported
    fn parents(&self) -> OutputResult<Vec<Parent>>;

    /// Inserts or replaces parents by identity
    fn write_parents(&mut self, parents: &[Parent]) -> OutputResult<()>;

    /// Replaces the stored replies of one parent
    fn write_replies(&mut self, parent_identity: &str, replies: &[Reply]) -> OutputResult<()>;

    /// Both streams in output order
    fn merged(&self) -> OutputResult<MergedOutput>;

    /// Records a finished run; sinks without run history ignore it
    fn record_run(&mut self, _run: &RunRecord) -> OutputResult<()> {
        Ok(())
    }

    /// Most recent runs, newest first; empty for sinks without run history
    fn recent_runs(&self, _limit: usize) -> OutputResult<Vec<RunRecord>> {
        Ok(Vec::new())
    }
}

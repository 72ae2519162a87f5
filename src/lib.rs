//! Thread-Harvest: an incremental, resumable exporter for threaded channel history
//!
//! This crate pages through a channel's parent messages, fans out to fetch
//! every thread's replies under a bounded worker pool, and checkpoints its
//! progress so an interrupted export resumes without repeating completed work.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Thread-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] crawler::TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Malformed API response from {method}: {message}")]
    Malformed { method: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Run stopped before completion")]
    Stopped,
}

impl HarvestError {
    /// Returns true if the run must halt on this error
    ///
    /// Only per-parent reply failures are recoverable, and the reply stage
    /// decides that by calling this on the task's error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            Self::Malformed { .. } => false,
            _ => true,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Thread-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{harvest, RunSummary, StopFlag};
pub use model::{Parent, Position, Reply};

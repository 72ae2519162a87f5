//! High-water mark of committed parents

use crate::model::Position;
use crate::storage::{read_optional, write_atomic, StorageError, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable "highest position seen" marker
///
/// Stored as a single line of text. The store never moves backwards: `advance`
/// keeps the greater of the stored and offered positions.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the checkpoint; None means no parent pass has ever completed
    pub fn load(&self) -> StorageResult<Option<Position>> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line.chars().any(char::is_whitespace) {
            return Err(StorageError::Corrupt {
                path: self.path.clone(),
                message: format!("unexpected checkpoint value '{}'", line),
            });
        }

        Ok(Some(Position::new(line)))
    }

    /// Replaces the stored checkpoint unconditionally
    pub fn store(&self, position: &Position) -> StorageResult<()> {
        write_atomic(&self.path, format!("{}\n", position).as_bytes())
    }

    /// Moves the checkpoint forward to `position` unless it is already past it
    ///
    /// Returns the checkpoint in effect after the call.
    pub fn advance(&self, position: &Position) -> StorageResult<Position> {
        match self.load()? {
            Some(current) if current >= *position => Ok(current),
            _ => {
                self.store(position)?;
                tracing::debug!("Checkpoint advanced to {}", position);
                Ok(position.clone())
            }
        }
    }

    /// Removes the checkpoint so the next run fetches the full history
    pub fn clear(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }
}

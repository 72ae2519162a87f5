//! Per-pass reply-fetch progress

use crate::storage::{read_optional, write_atomic, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Parents awaiting reply fetch and the cursor into them
///
/// Invariant: `next_index <= sequence.len()`. Everything before `next_index`
/// has either been written to output or recorded in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub sequence: Vec<String>,

    pub next_index: usize,

    /// Parents passed by the cursor without their replies being written
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,

    /// Failed passes so far, for parents carried into the next pass
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attempts: BTreeMap<String, u32>,
}

/// What `finish_pass` did with the pass's failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Parents carried into the next pass
    pub carried: Vec<String>,

    /// Parents dropped after reaching the attempt cap
    pub abandoned: Vec<String>,
}

impl ProgressState {
    /// Starts a pass over `identities`, dropping repeated ids
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let sequence = identities
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Self {
            sequence,
            ..Self::default()
        }
    }

    /// Appends identities not already in the sequence
    pub fn extend<I>(&mut self, identities: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: HashSet<String> = self.sequence.iter().cloned().collect();
        for identity in identities {
            if seen.insert(identity.clone()) {
                self.sequence.push(identity);
            }
        }
    }

    /// True when no pass is in progress
    pub fn is_reset(&self) -> bool {
        self.sequence.is_empty() && self.next_index == 0
    }

    pub fn is_drained(&self) -> bool {
        self.next_index >= self.sequence.len()
    }

    /// Identities the cursor has not reached yet
    pub fn remaining(&self) -> &[String] {
        &self.sequence[self.next_index.min(self.sequence.len())..]
    }

    /// Moves the cursor past one parent
    ///
    /// A failed parent is remembered so the end of the pass can carry it over.
    pub fn advance(&mut self, succeeded: bool) {
        if let Some(identity) = self.sequence.get(self.next_index) {
            if !succeeded {
                self.failed.push(identity.clone());
            }
            self.next_index += 1;
        }
    }

    /// Closes a drained pass
    ///
    /// Without failures the state returns to `{empty, 0}`. Otherwise the failed
    /// parents become the next pass's sequence, minus any that reached
    /// `max_attempts` failed passes.
    pub fn finish_pass(&mut self, max_attempts: Option<u32>) -> PassOutcome {
        debug_assert!(self.is_drained());

        if self.failed.is_empty() {
            *self = Self::default();
            return PassOutcome::default();
        }

        let mut outcome = PassOutcome::default();
        let mut attempts = BTreeMap::new();
        for identity in std::mem::take(&mut self.failed) {
            let count = self.attempts.get(&identity).copied().unwrap_or(0) + 1;
            if max_attempts.is_some_and(|max| count >= max) {
                outcome.abandoned.push(identity);
            } else {
                attempts.insert(identity.clone(), count);
                outcome.carried.push(identity);
            }
        }

        *self = Self {
            sequence: outcome.carried.clone(),
            next_index: 0,
            failed: Vec::new(),
            attempts,
        };
        outcome
    }

    fn check(&self, path: &Path) -> StorageResult<()> {
        if self.next_index > self.sequence.len() {
            return Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                message: format!(
                    "next_index {} exceeds sequence length {}",
                    self.next_index,
                    self.sequence.len()
                ),
            });
        }
        Ok(())
    }
}

/// Durable store for `ProgressState`
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last stored state; a missing file is the reset state
    pub fn load(&self) -> StorageResult<ProgressState> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(ProgressState::default());
        };
        if content.trim().is_empty() {
            return Ok(ProgressState::default());
        }

        let state: ProgressState =
            serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        state.check(&self.path)?;
        Ok(state)
    }

    /// Atomically replaces the stored state
    pub fn store(&self, state: &ProgressState) -> StorageResult<()> {
        state.check(&self.path)?;
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes)
    }

    /// Stores the reset state
    pub fn reset(&self) -> StorageResult<()> {
        self.store(&ProgressState::default())
    }
}

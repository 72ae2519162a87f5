//! JSON file sink
//!
//! Writes `threads.json` and `replies.json` as pretty-printed arrays in
//! merged order. Each write atomically replaces the affected file, so the cost
//! of a write grows with the size of the export; large channels should use
//! `format = "sqlite"`, which writes one thread per transaction.

use crate::crawler::{merge, MergedOutput};
use crate::model::{Parent, Reply};
use crate::output::traits::{OutputError, OutputResult, Sink};
use crate::storage::{read_optional, write_atomic};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PARENTS_FILE: &str = "threads.json";
pub const REPLIES_FILE: &str = "replies.json";

/// Sink backed by two JSON files
pub struct JsonFileSink {
    parents_path: PathBuf,
    replies_path: PathBuf,
    parents: BTreeMap<String, Parent>,
    replies: BTreeMap<String, Vec<Reply>>,
}

impl JsonFileSink {
    /// Opens the sink in `directory`, loading any previous export
    pub fn open(directory: &Path) -> OutputResult<Self> {
        let parents_path = directory.join(PARENTS_FILE);
        let replies_path = directory.join(REPLIES_FILE);

        let parents = load_array::<Parent>(&parents_path)?
            .into_iter()
            .map(|p| (p.identity.clone(), p))
            .collect();

        let mut replies: BTreeMap<String, Vec<Reply>> = BTreeMap::new();
        for reply in load_array::<Reply>(&replies_path)? {
            replies
                .entry(reply.parent_identity.clone())
                .or_default()
                .push(reply);
        }

        Ok(Self {
            parents_path,
            replies_path,
            parents,
            replies,
        })
    }

    fn snapshot(&self) -> MergedOutput {
        merge(
            self.parents.values().cloned().collect(),
            self.replies.values().flatten().cloned().collect(),
        )
    }
}

impl Sink for JsonFileSink {
    fn parents(&self) -> OutputResult<Vec<Parent>> {
        Ok(self.snapshot().parents)
    }

    fn write_parents(&mut self, parents: &[Parent]) -> OutputResult<()> {
        for parent in parents {
            self.parents.insert(parent.identity.clone(), parent.clone());
        }
        let merged = self.snapshot();
        write_atomic(&self.parents_path, &serde_json::to_vec_pretty(&merged.parents)?)?;
        Ok(())
    }

    // Rewrites the whole replies file for every parent
    fn write_replies(&mut self, parent_identity: &str, replies: &[Reply]) -> OutputResult<()> {
        self.replies
            .insert(parent_identity.to_string(), replies.to_vec());
        let merged = self.snapshot();
        write_atomic(&self.replies_path, &serde_json::to_vec_pretty(&merged.replies)?)?;
        Ok(())
    }

    fn merged(&self) -> OutputResult<MergedOutput> {
        Ok(self.snapshot())
    }
}

fn load_array<T: DeserializeOwned>(path: &Path) -> OutputResult<Vec<T>> {
    match read_optional(path)? {
        Some(content) if !content.trim().is_empty() => {
            serde_json::from_str(&content).map_err(|e| OutputError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
        _ => Ok(Vec::new()),
    }
}

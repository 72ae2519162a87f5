//! Deterministic ordering of fetched records
//!
//! Concurrent fetching and paged retrieval do not preserve chronological
//! order, so every emission goes through `merge` first.

use crate::model::{Parent, Reply};
use std::collections::BTreeMap;

/// Ordered parent and reply streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedOutput {
    /// Parents by ascending position
    pub parents: Vec<Parent>,

    /// Replies grouped by parent (in parent order), each group by ascending
    /// position
    pub replies: Vec<Reply>,
}

/// Sorts parents and replies into their output order
///
/// Replies whose parent is not in `parents` are kept and emitted after all
/// known threads, grouped by parent identity. Records sharing a position are
/// collapsed to the last one given.
pub fn merge(parents: Vec<Parent>, replies: Vec<Reply>) -> MergedOutput {
    let mut by_position = BTreeMap::new();
    for parent in parents {
        by_position.insert(parent.position.clone(), parent);
    }
    let parents: Vec<Parent> = by_position.into_values().collect();

    let mut threads: BTreeMap<String, BTreeMap<_, Reply>> = BTreeMap::new();
    for reply in replies {
        threads
            .entry(reply.parent_identity.clone())
            .or_default()
            .insert(reply.position.clone(), reply);
    }

    let mut ordered = Vec::new();
    for parent in &parents {
        if let Some(thread) = threads.remove(&parent.identity) {
            ordered.extend(thread.into_values());
        }
    }
    for (_, orphaned) in threads {
        ordered.extend(orphaned.into_values());
    }

    MergedOutput {
        parents,
        replies: ordered,
    }
}

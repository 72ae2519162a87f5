//! Bounded-concurrency retrieval of thread replies
//!
//! `ReplyPool` runs one task per parent, each paging through that parent's
//! replies. Completions are handed back one at a time in whatever order the
//! tasks finish; the caller decides what is durable.

use crate::crawler::api::SlackApi;
use crate::model::Reply;
use crate::HarvestError;
use std::collections::{BTreeMap, HashSet};
use tokio::task::JoinSet;

/// A parent whose replies could not be fetched this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFailure {
    pub identity: String,
    pub error: String,
}

/// A finished reply task
#[derive(Debug)]
pub struct Completion {
    /// Position of the parent in the pool's sequence
    pub index: usize,
    pub identity: String,
    pub result: Result<Vec<Reply>, HarvestError>,
}

/// Replies and failures from an untracked `fetch_all`
#[derive(Debug, Default)]
pub struct ReplyResults {
    pub replies: Vec<Reply>,
    pub failures: Vec<ParentFailure>,
}

/// Fan-out over a sequence of parents
///
/// Dispatch is limited two ways: at most `concurrency` tasks in flight, and no
/// task for an index at or beyond `cursor + concurrency`, where `cursor` is the
/// caller's durable progress. The second bound keeps the work that can be
/// repeated after a crash to at most one window of parents. A parent id is
/// never dispatched while another task for the same id is running.
pub struct ReplyPool {
    api: SlackApi,
    concurrency: usize,
    sequence: Vec<String>,
    next_dispatch: usize,
    in_flight: HashSet<String>,
    workers: JoinSet<(usize, String, Result<Vec<Reply>, HarvestError>)>,
}

impl ReplyPool {
    /// Creates a pool over `sequence`, starting at `start`
    pub fn new(api: SlackApi, concurrency: usize, sequence: Vec<String>, start: usize) -> Self {
        Self {
            api,
            concurrency: concurrency.max(1),
            next_dispatch: start.min(sequence.len()),
            sequence,
            in_flight: HashSet::new(),
            workers: JoinSet::new(),
        }
    }

    /// Dispatches as many tasks as the window around `cursor` allows
    pub fn fill(&mut self, cursor: usize) {
        let window_end = cursor.saturating_add(self.concurrency).min(self.sequence.len());

        while self.next_dispatch < window_end && self.in_flight.len() < self.concurrency {
            let index = self.next_dispatch;
            let identity = self.sequence[index].clone();
            if self.in_flight.contains(&identity) {
                // Wait for the running task on this id to finish first
                break;
            }

            self.in_flight.insert(identity.clone());
            self.next_dispatch += 1;

            let api = self.api.clone();
            self.workers.spawn(async move {
                let result = fetch_thread(&api, &identity).await;
                (index, identity, result)
            });
        }
    }

    /// Waits for the next task to finish; None when nothing is running
    pub async fn next_completion(&mut self) -> Option<Result<Completion, HarvestError>> {
        let joined = self.workers.join_next().await?;
        Some(match joined {
            Ok((index, identity, result)) => {
                self.in_flight.remove(&identity);
                Ok(Completion {
                    index,
                    identity,
                    result,
                })
            }
            Err(e) => Err(HarvestError::Worker(e.to_string())),
        })
    }
}

/// Fetches every reply of one parent, preserving API page order
pub async fn fetch_thread(api: &SlackApi, parent_identity: &str) -> Result<Vec<Reply>, HarvestError> {
    let mut replies = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = api.list_replies(parent_identity, cursor.as_deref()).await?;
        replies.extend(
            page.items
                .into_iter()
                .filter_map(|message| Reply::from_message(parent_identity, message)),
        );

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(replies)
}

/// Retrieves replies for parents with bounded concurrency
pub struct ReplyFetcher {
    api: SlackApi,
    concurrency: usize,
}

impl ReplyFetcher {
    pub fn new(api: SlackApi, concurrency: usize) -> Self {
        Self {
            api,
            concurrency: concurrency.max(1),
        }
    }

    /// Creates a pool over `sequence` resuming at `start`
    pub fn pool(&self, sequence: Vec<String>, start: usize) -> ReplyPool {
        ReplyPool::new(self.api.clone(), self.concurrency, sequence, start)
    }

    /// Fetches replies for every parent without tracking progress
    ///
    /// Per-parent failures are collected; a fatal error aborts the remaining
    /// tasks and is returned.
    pub async fn fetch_all(&self, parents: Vec<String>) -> Result<ReplyResults, HarvestError> {
        let mut pool = self.pool(parents, 0);
        let mut settled = BTreeMap::new();
        let mut cursor = 0;
        let mut results = ReplyResults::default();

        pool.fill(cursor);
        while let Some(completion) = pool.next_completion().await {
            let completion = completion?;
            match completion.result {
                Ok(replies) => results.replies.extend(replies),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => results.failures.push(ParentFailure {
                    identity: completion.identity,
                    error: e.to_string(),
                }),
            }
            settled.insert(completion.index, ());
            while settled.remove(&cursor).is_some() {
                cursor += 1;
            }
            pool.fill(cursor);
        }

        Ok(results)
    }
}

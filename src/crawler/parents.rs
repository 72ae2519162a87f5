//! Cursor-paginated retrieval of parent messages

use crate::crawler::api::SlackApi;
use crate::model::{Parent, Position};
use crate::HarvestError;
use std::collections::HashSet;

/// Result of draining a `ParentFetcher`
#[derive(Debug, Clone, Default)]
pub struct ParentBatch {
    /// Parents newer than the starting position with at least one reply
    pub parents: Vec<Parent>,

    /// Highest position seen on any page; safe to commit
    pub high_water: Option<Position>,

    /// Newer parents skipped because they have no replies
    pub without_replies: usize,
}

/// Lazy stream of parents newer than a checkpoint
///
/// Each call to `next_page` fetches one API page. The high-water mark is only
/// exposed once the stream has been exhausted without error, so a pass that
/// fails partway can never advance the checkpoint.
pub struct ParentFetcher {
    api: SlackApi,
    since: Option<Position>,
    cursor: Option<String>,
    exhausted: bool,
    max_seen: Option<Position>,
    seen: HashSet<String>,
    pages: usize,
    messages: usize,
    without_replies: usize,
}

impl ParentFetcher {
    /// Starts a stream of parents strictly newer than `since`
    pub fn since(api: SlackApi, since: Option<Position>) -> Self {
        Self {
            api,
            since,
            cursor: None,
            exhausted: false,
            max_seen: None,
            seen: HashSet::new(),
            pages: 0,
            messages: 0,
            without_replies: 0,
        }
    }

    /// Fetches the next page, or returns None once the API has no more
    pub async fn next_page(&mut self) -> Result<Option<Vec<Parent>>, HarvestError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .api
            .list_parents(self.cursor.as_deref(), self.since.as_ref())
            .await?;
        self.pages += 1;
        self.messages += page.items.len();

        let mut parents = Vec::new();
        for message in page.items {
            let Some(parent) = Parent::from_message(message) else {
                tracing::debug!("Skipping history message without ts");
                continue;
            };
            if self.since.as_ref().is_some_and(|since| parent.position <= *since) {
                continue;
            }
            if self.max_seen.as_ref().map_or(true, |max| parent.position > *max) {
                self.max_seen = Some(parent.position.clone());
            }
            if !parent.has_replies() {
                self.without_replies += 1;
                continue;
            }
            if !self.seen.insert(parent.identity.clone()) {
                continue;
            }

            let preview: String = parent
                .payload
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .trim()
                .chars()
                .take(50)
                .collect();
            tracing::debug!(
                parent = %parent.identity,
                reply_count = parent.reply_count,
                "Found thread: {}",
                preview
            );
            parents.push(parent);
        }

        match page.next_cursor {
            Some(cursor) => {
                tracing::info!(
                    "Continuing: {} messages processed over {} pages",
                    self.messages,
                    self.pages
                );
                self.cursor = Some(cursor);
            }
            None => {
                tracing::info!(
                    "No more history: {} messages processed over {} pages",
                    self.messages,
                    self.pages
                );
                self.exhausted = true;
            }
        }

        Ok(Some(parents))
    }

    /// Highest position seen, available only after exhaustion
    pub fn high_water_mark(&self) -> Option<&Position> {
        if self.exhausted {
            self.max_seen.as_ref()
        } else {
            None
        }
    }

    /// Drains the stream
    pub async fn collect(mut self) -> Result<ParentBatch, HarvestError> {
        let mut parents = Vec::new();
        while let Some(page) = self.next_page().await? {
            parents.extend(page);
        }

        Ok(ParentBatch {
            high_water: self.high_water_mark().cloned(),
            parents,
            without_replies: self.without_replies,
        })
    }
}

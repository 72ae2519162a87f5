//! Typed wrappers over the three remote API operations

use crate::crawler::transport::{ApiRequest, RateLimitedTransport};
use crate::model::Position;
use crate::HarvestError;
use serde_json::{Map, Value};
use std::sync::Arc;

const HISTORY_METHOD: &str = "conversations.history";
const REPLIES_METHOD: &str = "conversations.replies";
const PERMALINK_METHOD: &str = "chat.getPermalink";

/// One page of raw messages
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Map<String, Value>>,

    /// Cursor for the following page; None on the last page
    pub next_cursor: Option<String>,
}

/// Channel-scoped API client
///
/// Cheap to clone; all clones share one transport.
#[derive(Clone)]
pub struct SlackApi {
    transport: Arc<RateLimitedTransport>,
    channel: String,
    page_limit: u32,
}

impl SlackApi {
    pub fn new(transport: Arc<RateLimitedTransport>, channel: impl Into<String>, page_limit: u32) -> Self {
        Self {
            transport,
            channel: channel.into(),
            page_limit,
        }
    }

    /// Lists one page of channel history
    ///
    /// `oldest` lets the server skip messages at or before the checkpoint.
    pub async fn list_parents(
        &self,
        cursor: Option<&str>,
        oldest: Option<&Position>,
    ) -> Result<Page, HarvestError> {
        let mut request = ApiRequest::new(HISTORY_METHOD)
            .param("channel", &self.channel)
            .param("limit", self.page_limit);
        if let Some(oldest) = oldest {
            request = request.param("oldest", oldest);
        }
        if let Some(cursor) = cursor {
            request = request.param("cursor", cursor);
        }

        let body = self.transport.send(&request).await?;
        parse_page(HISTORY_METHOD, body)
    }

    /// Lists one page of a thread, starting with the parent itself
    pub async fn list_replies(
        &self,
        parent_identity: &str,
        cursor: Option<&str>,
    ) -> Result<Page, HarvestError> {
        let mut request = ApiRequest::new(REPLIES_METHOD)
            .param("channel", &self.channel)
            .param("ts", parent_identity)
            .param("limit", self.page_limit);
        if let Some(cursor) = cursor {
            request = request.param("cursor", cursor);
        }

        let body = self.transport.send(&request).await?;
        parse_page(REPLIES_METHOD, body)
    }

    /// Resolves the permalink of a message
    pub async fn permalink(&self, message_ts: &str) -> Result<String, HarvestError> {
        let request = ApiRequest::new(PERMALINK_METHOD)
            .param("channel", &self.channel)
            .param("message_ts", message_ts);

        let body = self.transport.send(&request).await?;
        body.get("permalink")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HarvestError::Malformed {
                method: PERMALINK_METHOD.to_string(),
                message: "missing 'permalink'".to_string(),
            })
    }
}

/// Extracts `messages` and `response_metadata.next_cursor` from a body
fn parse_page(method: &str, mut body: Map<String, Value>) -> Result<Page, HarvestError> {
    let malformed = |message: &str| HarvestError::Malformed {
        method: method.to_string(),
        message: message.to_string(),
    };

    let items = match body.remove("messages") {
        Some(Value::Array(messages)) => messages
            .into_iter()
            .map(|m| match m {
                Value::Object(map) => Ok(map),
                _ => Err(malformed("non-object entry in 'messages'")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(malformed("'messages' is not an array")),
        None => return Err(malformed("missing 'messages'")),
    };

    let next_cursor = body
        .get("response_metadata")
        .and_then(|meta| meta.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    Ok(Page { items, next_cursor })
}

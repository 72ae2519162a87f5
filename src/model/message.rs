use crate::model::Position;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A thread-starting message
///
/// `payload` holds the complete message object as returned by the API and is
/// passed through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    /// Stable id of the thread (the parent's `ts`)
    pub identity: String,

    pub position: Position,

    pub reply_count: u64,

    /// Link to the thread, attached by the permalink stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,

    pub payload: Map<String, Value>,
}

impl Parent {
    /// Builds a parent from a raw history message
    ///
    /// Returns None for messages without a `ts`.
    pub fn from_message(message: Map<String, Value>) -> Option<Self> {
        let ts = message.get("ts")?.as_str()?.to_string();
        let reply_count = message
            .get("reply_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Some(Self {
            identity: ts.clone(),
            position: Position::new(ts),
            reply_count,
            permalink: None,
            payload: message,
        })
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count > 0
    }

    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// A message nested under one parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub parent_identity: String,

    pub position: Position,

    pub payload: Map<String, Value>,
}

impl Reply {
    /// Builds a reply from a raw thread message
    ///
    /// The replies endpoint returns the thread's parent as its first item, so
    /// messages whose `ts` equals their `thread_ts` are rejected here.
    pub fn from_message(parent_identity: &str, message: Map<String, Value>) -> Option<Self> {
        let ts = message.get("ts")?.as_str()?;
        let thread_ts = message.get("thread_ts")?.as_str()?;
        if ts == thread_ts {
            return None;
        }

        Some(Self {
            parent_identity: parent_identity.to_string(),
            position: Position::new(ts),
            payload: message,
        })
    }
}

/// Flattened projection of a parent for tabular export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRow {
    pub ts: String,
    pub user: String,
    pub text: String,
    pub thread_ts: String,
    pub reply_count: u64,
    pub subtype: String,
    pub thread_url: String,
}

impl ParentRow {
    pub const HEADER: [&'static str; 7] = [
        "ts",
        "user",
        "text",
        "thread_ts",
        "reply_count",
        "subtype",
        "thread_url",
    ];

    pub fn fields(&self) -> [String; 7] {
        [
            self.ts.clone(),
            self.user.clone(),
            self.text.clone(),
            self.thread_ts.clone(),
            self.reply_count.to_string(),
            self.subtype.clone(),
            self.thread_url.clone(),
        ]
    }
}

impl From<&Parent> for ParentRow {
    fn from(parent: &Parent) -> Self {
        Self {
            ts: parent.position.to_string(),
            user: parent.payload_str("user").unwrap_or("Unknown").to_string(),
            text: parent.payload_str("text").unwrap_or("").replace('\n', " "),
            // A thread-starting message is its own thread root
            thread_ts: parent.identity.clone(),
            reply_count: parent.reply_count,
            subtype: parent
                .payload_str("subtype")
                .unwrap_or("normal_message")
                .to_string(),
            thread_url: parent.permalink.clone().unwrap_or_default(),
        }
    }
}

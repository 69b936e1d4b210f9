//! Thread model representing a Gmail conversation

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Message, Tag};

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A conversation: messages ordered oldest to newest plus aggregates
///
/// Built only through [`Thread::from_messages`]; the message order given
/// there is kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Gmail thread ID
    pub id: ThreadId,
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Whether any message is unread
    pub has_unread: bool,
    /// Number of messages in the thread
    pub total_replies: usize,
    /// Union of message labels, one entry per label id
    pub labels: Vec<Tag>,
}

impl Thread {
    /// Assemble a thread from messages in provider order
    pub fn from_messages(id: ThreadId, messages: Vec<Message>) -> Self {
        let has_unread = messages.iter().any(|m| m.unread);
        let total_replies = messages.len();

        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for tag in messages.iter().flat_map(|m| m.tags.iter()) {
            if seen.insert(tag.id.clone()) {
                labels.push(tag.clone());
            }
        }

        Self {
            id,
            messages,
            has_unread,
            total_replies,
            labels,
        }
    }

    /// The newest message
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A thread entry from a folder listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub snippet: Option<String>,
    pub history_id: Option<String>,
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadPage {
    pub threads: Vec<ThreadSummary>,
    pub next_page_token: Option<String>,
}

//! Draft and outgoing message models

use serde::{Deserialize, Serialize};

use super::{EmailAddress, Message, MessageId, ThreadId};

/// Unique identifier for a draft (Gmail draft ID, distinct from its message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl DraftId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DraftId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A file to attach to an outgoing message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingAttachment {
    pub filename: String,
    /// Declared MIME type; `application/octet-stream` when absent
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// A compose request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    /// HTML body, sanitized during assembly
    pub html: String,
    pub attachments: Vec<OutgoingAttachment>,
    /// Extra headers such as `References` or `In-Reply-To`
    pub headers: Vec<(String, String)>,
    /// Sender override; defaults to the authenticated account
    pub from_override: Option<EmailAddress>,
    /// Thread to reply into
    pub thread_id: Option<ThreadId>,
}

/// Result of a send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: MessageId,
    pub thread_id: Option<ThreadId>,
}

/// A draft save request; `id` selects update-in-place
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftRequest {
    pub id: Option<DraftId>,
    pub message: OutgoingMessage,
}

/// A parsed draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    /// HTML (or top-level body) content
    pub content: String,
    /// Underlying provider message
    pub message_id: Option<MessageId>,
    pub thread_id: Option<ThreadId>,
}

/// A draft entry from a listing, decoded like any other message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedDraft {
    pub id: DraftId,
    pub message: Message,
}

/// One page of drafts, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftPage {
    pub drafts: Vec<ListedDraft>,
    pub next_page_token: Option<String>,
}

/// A send-as identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAlias {
    pub email: String,
    pub name: Option<String>,
    pub primary: bool,
}

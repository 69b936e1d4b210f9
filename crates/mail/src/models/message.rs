//! Message model: the normalized projection of one provider message

use super::{Attachment, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Placeholder sender for messages without a usable `From` header
    pub fn unknown_sender() -> Self {
        Self::with_name("No Sender Name", "no-sender@unknown")
    }

    /// Parse a single address like `John Doe <john@example.com>`
    ///
    /// Surrounding quotes on the display name are removed. Input without
    /// angle brackets is taken as a bare address.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.trim_matches('"').to_string(),
        }
    }

    /// Lowercased address, used for case-insensitive comparison
    pub fn normalized(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A label reference attached to a single message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

impl Tag {
    /// Tag for a provider label id; messages only carry ids, so the id doubles as the name
    pub fn from_label_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }
}

/// A single decoded email message within a thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    /// ID of the thread this message belongs to
    pub thread_id: ThreadId,
    /// Sender
    pub sender: EmailAddress,
    /// Recipients (To field)
    pub to: Vec<EmailAddress>,
    /// CC recipients; `None` when the header is absent
    pub cc: Option<Vec<EmailAddress>>,
    /// BCC recipients; `None` when the header is absent
    pub bcc: Option<Vec<EmailAddress>>,
    /// Reply-To addresses; `None` when the header is absent
    pub reply_to: Option<Vec<EmailAddress>>,
    /// Subject line
    pub subject: String,
    /// Provider snippet
    pub snippet: String,
    /// When the message was received
    pub received_on: DateTime<Utc>,
    /// Whether the message carries the UNREAD label
    pub unread: bool,
    /// Whether transport headers indicate TLS delivery
    pub tls: bool,
    /// Provider labels on this message
    pub tags: Vec<Tag>,
    /// Displayable HTML body with inline resources resolved
    pub body_html: String,
    /// Downloadable attachments (inline resources excluded)
    pub attachments: Vec<Attachment>,
    /// `Message-ID` header
    pub message_id: Option<String>,
    /// `In-Reply-To` header
    pub in_reply_to: Option<String>,
    /// `References` header
    pub references: Option<String>,
    /// `List-Unsubscribe` header
    pub list_unsubscribe: Option<String>,
    /// `List-Unsubscribe-Post` header
    pub list_unsubscribe_post: Option<String>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId, thread_id: ThreadId) -> MessageBuilder {
        MessageBuilder::new(id, thread_id)
    }
}

/// Builder for creating Message instances
///
/// `unread` is not settable: `build` derives it from the tag set.
pub struct MessageBuilder {
    id: MessageId,
    thread_id: ThreadId,
    sender: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    cc: Option<Vec<EmailAddress>>,
    bcc: Option<Vec<EmailAddress>>,
    reply_to: Option<Vec<EmailAddress>>,
    subject: String,
    snippet: String,
    received_on: Option<DateTime<Utc>>,
    tls: bool,
    tags: Vec<Tag>,
    body_html: String,
    attachments: Vec<Attachment>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Option<String>,
    list_unsubscribe: Option<String>,
    list_unsubscribe_post: Option<String>,
}

impl MessageBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            sender: None,
            to: Vec::new(),
            cc: None,
            bcc: None,
            reply_to: None,
            subject: String::new(),
            snippet: String::new(),
            received_on: None,
            tls: false,
            tags: Vec::new(),
            body_html: String::new(),
            attachments: Vec::new(),
            message_id: None,
            in_reply_to: None,
            references: None,
            list_unsubscribe: None,
            list_unsubscribe_post: None,
        }
    }

    pub fn sender(mut self, sender: EmailAddress) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn cc(mut self, cc: Option<Vec<EmailAddress>>) -> Self {
        self.cc = cc;
        self
    }

    pub fn bcc(mut self, bcc: Option<Vec<EmailAddress>>) -> Self {
        self.bcc = bcc;
        self
    }

    pub fn reply_to(mut self, reply_to: Option<Vec<EmailAddress>>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn received_on(mut self, received_on: DateTime<Utc>) -> Self {
        self.received_on = Some(received_on);
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn label_ids<I, S>(mut self, label_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = label_ids.into_iter().map(Tag::from_label_id).collect();
        self
    }

    pub fn body_html(mut self, body_html: impl Into<String>) -> Self {
        self.body_html = body_html.into();
        self
    }

    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn message_id(mut self, value: Option<String>) -> Self {
        self.message_id = value;
        self
    }

    pub fn in_reply_to(mut self, value: Option<String>) -> Self {
        self.in_reply_to = value;
        self
    }

    pub fn references(mut self, value: Option<String>) -> Self {
        self.references = value;
        self
    }

    pub fn list_unsubscribe(mut self, value: Option<String>) -> Self {
        self.list_unsubscribe = value;
        self
    }

    pub fn list_unsubscribe_post(mut self, value: Option<String>) -> Self {
        self.list_unsubscribe_post = value;
        self
    }

    pub fn build(self) -> Message {
        let unread = self.tags.iter().any(|t| t.id == super::LabelId::UNREAD);
        Message {
            id: self.id,
            thread_id: self.thread_id,
            sender: self.sender.unwrap_or_else(EmailAddress::unknown_sender),
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            snippet: self.snippet,
            received_on: self.received_on.unwrap_or_else(Utc::now),
            unread,
            tls: self.tls,
            tags: self.tags,
            body_html: self.body_html,
            attachments: self.attachments,
            message_id: self.message_id,
            in_reply_to: self.in_reply_to,
            references: self.references,
            list_unsubscribe: self.list_unsubscribe,
            list_unsubscribe_post: self.list_unsubscribe_post,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("John Doe <john@example.com>");
        assert_eq!(addr.name, Some("John Doe".to_string()));
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_with_quoted_name() {
        let addr = EmailAddress::parse("\"Doe, John\" <john@example.com>");
        assert_eq!(addr.name, Some("Doe, John".to_string()));
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_with_angle_brackets_no_name() {
        let addr = EmailAddress::parse("<john@example.com>");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::with_name("John Doe", "john@example.com");
        assert_eq!(addr.display(), "John Doe <john@example.com>");
    }

    #[test]
    fn test_unread_derived_from_labels() {
        let unread = Message::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .label_ids(["INBOX", "UNREAD"])
            .build();
        assert!(unread.unread);

        let read = Message::builder(MessageId::new("m2"), ThreadId::new("t1"))
            .label_ids(["INBOX"])
            .build();
        assert!(!read.unread);
    }

    #[test]
    fn test_missing_sender_uses_placeholder() {
        let msg = Message::builder(MessageId::new("m1"), ThreadId::new("t1")).build();
        assert_eq!(msg.sender.email, "no-sender@unknown");
    }
}

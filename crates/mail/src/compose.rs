//! Outgoing MIME assembly
//!
//! Turns an [`OutgoingMessage`] into a raw RFC 5322 document ready for the
//! provider: sender resolution, recipient normalization, HTML
//! sanitization, header passthrough and attachments.

use std::collections::HashSet;

use base64::prelude::*;
use lettre::Address;
use lettre::address::Envelope;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::error::DriverError;
use crate::models::{EmailAddress, OutgoingMessage};

const OCTET_STREAM: &str = "application/octet-stream";

/// Headers the builder manages itself; callers can't override them
const MANAGED_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "subject",
    "content-type",
    "content-transfer-encoding",
    "mime-version",
];

/// Assembly failures, all caused by caller input
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Invalid recipients: {0}")]
    InvalidRecipients(String),

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid header name {0:?}")]
    InvalidHeader(String),

    #[error("Failed to build message: {0}")]
    Build(String),
}

impl ComposeError {
    /// Standardized validation error for `operation`
    pub fn into_driver_error(self, operation: &str) -> DriverError {
        let code = match &self {
            ComposeError::InvalidRecipients(_) => "InvalidRecipients",
            ComposeError::InvalidAddress { .. } => "InvalidAddress",
            ComposeError::InvalidHeader(_) => "InvalidHeader",
            ComposeError::Build(_) => "BuildFailed",
        };
        DriverError::validation(operation, self.to_string()).with_code(code)
    }
}

/// Base64 alphabet for the encoded raw document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEncoding {
    /// URL-safe, unpadded: message send and draft create/update
    UrlSafe,
    /// Standard alphabet: raw draft send
    Standard,
}

/// A serialized MIME document
#[derive(Debug, Clone)]
pub struct AssembledMessage {
    mime: Vec<u8>,
}

impl AssembledMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.mime
    }

    /// Base64 of the whole document in the given alphabet
    pub fn encode(&self, encoding: TransportEncoding) -> String {
        match encoding {
            TransportEncoding::UrlSafe => BASE64_URL_SAFE_NO_PAD.encode(&self.mime),
            TransportEncoding::Standard => BASE64_STANDARD.encode(&self.mime),
        }
    }
}

/// Final recipient sets after normalization and de-duplication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
}

impl Recipients {
    fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }
}

/// Builds raw messages on behalf of one account
pub struct Assembler {
    account: EmailAddress,
}

impl Assembler {
    /// `account` is the sender used when a message has no override
    pub fn new(account: EmailAddress) -> Self {
        Self { account }
    }

    /// Assemble a message for sending; requires at least one `to` recipient
    pub fn assemble(&self, message: &OutgoingMessage) -> Result<AssembledMessage, ComposeError> {
        self.build(message, true)
    }

    /// Assemble a draft; recipients may still be missing
    pub fn assemble_draft(&self, message: &OutgoingMessage) -> Result<AssembledMessage, ComposeError> {
        self.build(message, false)
    }

    fn build(&self, message: &OutgoingMessage, require_to: bool) -> Result<AssembledMessage, ComposeError> {
        let sender = message
            .from_override
            .clone()
            .unwrap_or_else(|| self.account.clone());
        let sender = clean_address(&sender);
        let recipients = resolve_recipients(message, &sender, require_to)?;

        let from = to_mailbox(&sender)?;
        let mut builder = lettre::Message::builder()
            .from(from.clone())
            .subject(message.subject.clone())
            .keep_bcc();

        for addr in &recipients.to {
            builder = builder.to(to_mailbox(addr)?);
        }
        for addr in &recipients.cc {
            builder = builder.cc(to_mailbox(addr)?);
        }
        for addr in &recipients.bcc {
            builder = builder.bcc(to_mailbox(addr)?);
        }

        if recipients.is_empty() {
            // lettre derives an SMTP envelope from the recipients; a draft
            // without any still needs one, and it never reaches the document
            let envelope = Envelope::new(Some(from.email.clone()), vec![from.email.clone()])
                .map_err(|e| ComposeError::Build(e.to_string()))?;
            builder = builder.envelope(envelope);
        }

        for (name, value) in &message.headers {
            let lower = name.trim().to_ascii_lowercase();
            if MANAGED_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            builder = match lower.as_str() {
                "references" => builder.references(normalize_references(value)),
                "in-reply-to" => builder.in_reply_to(value.trim().to_string()),
                _ => {
                    let header_name = HeaderName::new_from_ascii(name.trim().to_string())
                        .map_err(|_| ComposeError::InvalidHeader(name.clone()))?;
                    builder.raw_header(HeaderValue::new(header_name, value.clone()))
                }
            };
        }

        let html = SinglePart::html(sanitize_html(&message.html));
        let built = if message.attachments.is_empty() {
            builder.singlepart(html)
        } else {
            let mut mixed = MultiPart::mixed().singlepart(html);
            for file in &message.attachments {
                let content_type = file
                    .content_type
                    .as_deref()
                    .filter(|ct| !ct.trim().is_empty())
                    .unwrap_or(OCTET_STREAM);
                let content_type = ContentType::parse(content_type)
                    .or_else(|_| ContentType::parse(OCTET_STREAM))
                    .map_err(|e| ComposeError::Build(e.to_string()))?;
                mixed = mixed.singlepart(Attachment::new(file.filename.clone()).body(file.data.clone(), content_type));
            }
            builder.multipart(mixed)
        };
        let email = built.map_err(|e| ComposeError::Build(e.to_string()))?;

        Ok(AssembledMessage {
            mime: email.formatted(),
        })
    }
}

/// Normalize and de-duplicate recipients
///
/// Addresses are compared case-insensitively across to, cc and bcc in that
/// order; the first occurrence wins. The sender is dropped from cc and bcc
/// but kept in to.
pub fn resolve_recipients(
    message: &OutgoingMessage,
    sender: &EmailAddress,
    require_to: bool,
) -> Result<Recipients, ComposeError> {
    if require_to && message.to.is_empty() {
        return Err(ComposeError::InvalidRecipients("to list is empty".to_string()));
    }

    let sender_key = sender.normalized();
    let mut seen = HashSet::new();
    let mut take = |list: &[EmailAddress], drop_sender: bool| -> Result<Vec<EmailAddress>, ComposeError> {
        let mut out = Vec::new();
        for addr in list {
            let addr = clean_address(addr);
            if addr.email.is_empty() {
                if require_to {
                    return Err(ComposeError::InvalidRecipients(
                        "recipient address is empty".to_string(),
                    ));
                }
                continue;
            }
            let key = addr.normalized();
            if drop_sender && key == sender_key {
                continue;
            }
            if seen.insert(key) {
                out.push(addr);
            }
        }
        Ok(out)
    };

    let to = take(&message.to, false)?;
    let cc = take(&message.cc, true)?;
    let bcc = take(&message.bcc, true)?;

    if require_to && to.is_empty() {
        return Err(ComposeError::InvalidRecipients(
            "no resolvable to address".to_string(),
        ));
    }

    Ok(Recipients { to, cc, bcc })
}

/// Split a raw address into name and bare address, dropping angle brackets
fn clean_address(addr: &EmailAddress) -> EmailAddress {
    let parsed = EmailAddress::parse(&addr.email);
    let email = parsed
        .email
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string();
    EmailAddress {
        name: addr.name.clone().filter(|n| !n.trim().is_empty()).or(parsed.name),
        email,
    }
}

fn to_mailbox(addr: &EmailAddress) -> Result<Mailbox, ComposeError> {
    let email: Address = addr.email.parse().map_err(|e: lettre::address::AddressError| {
        ComposeError::InvalidAddress {
            address: addr.email.clone(),
            reason: e.to_string(),
        }
    })?;
    Ok(Mailbox::new(addr.name.clone(), email))
}

/// Wrap every whitespace-separated message id in angle brackets
pub fn normalize_references(value: &str) -> String {
    value
        .split_whitespace()
        .map(|token| {
            let id = token.trim_start_matches('<').trim_end_matches('>');
            format!("<{}>", id)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove scripts, handlers and other disallowed markup
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutgoingAttachment;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::new(s)
    }

    fn account() -> EmailAddress {
        EmailAddress::with_name("Me", "me@example.com")
    }

    fn message(to: &[&str]) -> OutgoingMessage {
        OutgoingMessage {
            to: to.iter().map(|s| addr(s)).collect(),
            subject: "Hello".into(),
            html: "<p>Hi there</p>".into(),
            ..Default::default()
        }
    }

    fn raw(message: &OutgoingMessage) -> String {
        let assembled = Assembler::new(account()).assemble(message).unwrap();
        String::from_utf8(assembled.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_empty_to_is_invalid() {
        let err = Assembler::new(account()).assemble(&message(&[])).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidRecipients(_)));
        assert_eq!(err.into_driver_error("create").code.as_deref(), Some("InvalidRecipients"));
    }

    #[test]
    fn test_blank_address_after_stripping_brackets_is_invalid() {
        let err = Assembler::new(account()).assemble(&message(&["<>"])).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidRecipients(_)));
    }

    #[test]
    fn test_dedup_case_insensitive() {
        let recipients = resolve_recipients(&message(&["A@x.com", "a@X.com"]), &account(), true).unwrap();
        assert_eq!(recipients.to.len(), 1);
        assert_eq!(recipients.to[0].email, "A@x.com");
    }

    #[test]
    fn test_dedup_across_lists() {
        let mut msg = message(&["a@x.com"]);
        msg.cc = vec![addr("A@X.COM"), addr("b@x.com")];
        msg.bcc = vec![addr("b@x.com"), addr("c@x.com")];
        let recipients = resolve_recipients(&msg, &account(), true).unwrap();
        assert_eq!(recipients.cc, vec![addr("b@x.com")]);
        assert_eq!(recipients.bcc, vec![addr("c@x.com")]);
    }

    #[test]
    fn test_sender_dropped_from_cc_and_bcc_only() {
        let mut msg = message(&["ME@example.com", "a@x.com"]);
        msg.cc = vec![addr("me@example.com")];
        msg.bcc = vec![addr("Me@Example.com"), addr("b@x.com")];
        let recipients = resolve_recipients(&msg, &account(), true).unwrap();
        assert_eq!(recipients.to.len(), 2);
        assert!(recipients.cc.is_empty());
        assert_eq!(recipients.bcc, vec![addr("b@x.com")]);
    }

    #[test]
    fn test_sender_in_cc_never_reaches_document() {
        let mut msg = message(&["a@x.com"]);
        msg.cc = vec![addr("me@example.com")];
        let doc = raw(&msg);
        assert!(!doc.lines().any(|l| l.starts_with("Cc:")));
    }

    #[test]
    fn test_angle_bracket_decoration_stripped() {
        let recipients = resolve_recipients(&message(&["Alice <alice@x.com>"]), &account(), true).unwrap();
        assert_eq!(recipients.to[0].email, "alice@x.com");
        assert_eq!(recipients.to[0].name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_normalize_references() {
        assert_eq!(normalize_references("<a@x> b@x <c@x>"), "<a@x> <b@x> <c@x>");
        assert_eq!(normalize_references("  a@x\n\tb@x "), "<a@x> <b@x>");
    }

    #[test]
    fn test_references_header_normalized_in_document() {
        let mut msg = message(&["a@x.com"]);
        msg.headers = vec![
            ("References".into(), "<a@x> b@x <c@x>".into()),
            ("X-Priority".into(), "1".into()),
        ];
        let doc = raw(&msg);
        assert!(doc.contains("References: <a@x> <b@x> <c@x>"));
        assert!(doc.contains("X-Priority: 1"));
    }

    #[test]
    fn test_body_is_sanitized() {
        let mut msg = message(&["a@x.com"]);
        msg.html = "<p>ok</p><script>alert(1)</script>".into();
        let doc = raw(&msg);
        assert!(!doc.contains("<script>"));
        assert!(!doc.contains("alert(1)"));
    }

    #[test]
    fn test_bcc_kept_in_document() {
        let mut msg = message(&["a@x.com"]);
        msg.bcc = vec![addr("hidden@x.com")];
        assert!(raw(&msg).contains("hidden@x.com"));
    }

    #[test]
    fn test_attachment_default_content_type() {
        let mut msg = message(&["a@x.com"]);
        msg.attachments = vec![OutgoingAttachment {
            filename: "notes.bin".into(),
            content_type: None,
            data: vec![0, 159, 146, 150],
        }];
        let doc = raw(&msg);
        assert!(doc.contains("multipart/mixed"));
        assert!(doc.contains("application/octet-stream"));
        assert!(doc.contains("notes.bin"));
    }

    #[test]
    fn test_from_override() {
        let mut msg = message(&["a@x.com"]);
        msg.from_override = Some(EmailAddress::with_name("Alias", "alias@example.com"));
        assert!(raw(&msg).contains("alias@example.com"));
    }

    #[test]
    fn test_draft_allows_missing_recipients() {
        let assembled = Assembler::new(account()).assemble_draft(&message(&[])).unwrap();
        assert!(!assembled.as_bytes().is_empty());
    }

    #[test]
    fn test_transport_encodings_differ_in_alphabet() {
        let assembled = AssembledMessage {
            mime: vec![0xfb, 0xff, 0xbf],
        };
        assert_eq!(assembled.encode(TransportEncoding::UrlSafe), "-_-_");
        assert_eq!(assembled.encode(TransportEncoding::Standard), "+/+/");
    }
}

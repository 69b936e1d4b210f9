//! Gmail message decoding
//!
//! Converts Gmail API messages and threads into domain models: picks the
//! best body, renders it as HTML, substitutes inline `cid:` resources with
//! `data:` URIs and extracts headers.
//!
//! Decoding never fails on message content. Missing bodies become empty
//! strings and an inline resource that can't be fetched keeps its `cid:`
//! reference.

use base64::prelude::*;
use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use rayon::prelude::*;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use super::api::{GmailMessage, GmailThread, Header, MessagePart};
use super::attachments::AttachmentResolver;
use super::content::{
    contains_html_tags, decode_base64_body, decode_html_entities, find_header, parse_address_list,
    plain_text_to_html, to_standard_base64, was_sent_with_tls,
};
use super::parts::{LeafPart, PartTree};
use super::GmailApi;
use crate::guard::ErrorGuard;
use crate::models::{EmailAddress, Message, MessageId, Thread, ThreadId};

/// Subject used when a message has none
pub const NO_SUBJECT: &str = "(no subject)";

/// Decoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Parts nested deeper than this are ignored
    pub max_part_depth: usize,
    /// Fetch attachment bodies while decoding instead of on demand
    pub fetch_attachment_bodies: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_part_depth: PartTree::DEFAULT_MAX_DEPTH,
            fetch_attachment_bodies: false,
        }
    }
}

/// Decodes provider messages, fetching inline resources as needed
pub struct MessageDecoder<'a> {
    api: &'a dyn GmailApi,
    guard: &'a ErrorGuard,
    options: &'a DecodeOptions,
}

impl<'a> MessageDecoder<'a> {
    pub fn new(api: &'a dyn GmailApi, guard: &'a ErrorGuard, options: &'a DecodeOptions) -> Self {
        Self { api, guard, options }
    }

    /// Decode every message of a thread, keeping provider order
    pub fn decode_thread(&self, thread: GmailThread) -> Thread {
        let messages = thread
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| self.decode(m))
            .collect();
        Thread::from_messages(ThreadId::new(thread.id), messages)
    }

    /// Decode one message
    pub fn decode(&self, gmail_msg: GmailMessage) -> Message {
        let payload = gmail_msg.payload.unwrap_or_default();
        let tree = PartTree::from_payload(&payload, self.options.max_part_depth);

        let body = select_body(&tree).map(render_body).unwrap_or_default();
        let body_html = self.resolve_inline(&gmail_msg.id, body, &tree);

        let resolver = AttachmentResolver::new(self.api, self.guard);
        let mut attachments = AttachmentResolver::list_attachments(&tree);
        if self.options.fetch_attachment_bodies {
            attachments = resolver.fetch_bodies(&gmail_msg.id, attachments);
        }

        let headers = &tree.headers;
        let sender = header(headers, "From")
            .and_then(|v| parse_address_list(v).into_iter().next())
            .unwrap_or_else(EmailAddress::unknown_sender);

        Message::builder(MessageId::new(&gmail_msg.id), ThreadId::new(&gmail_msg.thread_id))
            .sender(sender)
            .to(header(headers, "To").map(parse_address_list).unwrap_or_default())
            .cc(header(headers, "Cc").map(parse_address_list))
            .bcc(header(headers, "Bcc").map(parse_address_list))
            .reply_to(header(headers, "Reply-To").map(parse_address_list))
            .subject(clean_subject(header(headers, "Subject")))
            .snippet(decode_html_entities(&gmail_msg.snippet))
            .received_on(received_on(gmail_msg.internal_date.as_deref(), headers))
            .tls(was_sent_with_tls(headers))
            .label_ids(gmail_msg.label_ids.unwrap_or_default())
            .body_html(body_html)
            .attachments(attachments)
            .message_id(header(headers, "Message-ID").map(str::to_string))
            .in_reply_to(header(headers, "In-Reply-To").map(str::to_string))
            .references(header(headers, "References").map(str::to_string))
            .list_unsubscribe(header(headers, "List-Unsubscribe").map(str::to_string))
            .list_unsubscribe_post(header(headers, "List-Unsubscribe-Post").map(str::to_string))
            .build()
    }

    /// Replace `cid:` references with `data:` URIs
    ///
    /// Resources are fetched concurrently; a failed fetch leaves its
    /// reference untouched.
    fn resolve_inline(&self, message_id: &str, body: String, tree: &PartTree) -> String {
        let inline: Vec<&LeafPart> = tree
            .leaves()
            .into_iter()
            .filter(|leaf| leaf.is_inline_resource())
            .collect();
        if inline.is_empty() || body.is_empty() {
            return body;
        }

        let resolver = AttachmentResolver::new(self.api, self.guard);
        let resolved: Vec<(String, String)> = inline
            .par_iter()
            .filter_map(|leaf| {
                let content_id = leaf.content_id()?;
                let payload = match (leaf.data.as_deref(), leaf.attachment_id.as_deref()) {
                    (Some(data), _) if !data.is_empty() => to_standard_base64(data),
                    (_, Some(attachment_id)) => {
                        match resolver.fetch_attachment_body(message_id, attachment_id) {
                            Ok(bytes) => Some(BASE64_STANDARD.encode(bytes)),
                            Err(e) => {
                                warn!(
                                    "Inline resource cid:{} of message {} unavailable: {}",
                                    content_id, message_id, e
                                );
                                None
                            }
                        }
                    }
                    _ => None,
                }?;
                let mime = if leaf.mime_type.is_empty() {
                    "application/octet-stream"
                } else {
                    leaf.mime_type.as_str()
                };
                Some((content_id, format!("data:{};base64,{}", mime, payload)))
            })
            .collect();

        resolved
            .iter()
            .fold(body, |body, (content_id, uri)| substitute_cid(&body, content_id, uri))
    }
}

fn header<'h>(headers: &'h [Header], name: &str) -> Option<&'h str> {
    find_header(headers, name).map(str::trim).filter(|v| !v.is_empty())
}

/// Pick the body data: payload body, else first HTML leaf, else the first part
pub fn select_body(tree: &PartTree) -> Option<&str> {
    tree.payload_data
        .as_deref()
        .or_else(|| tree.first_html().and_then(|leaf| leaf.data.as_deref()))
        .or_else(|| tree.first_part_data())
}

/// Decode body data into displayable HTML
///
/// The base64-decoded text is entity-decoded once. If that leaves no tags
/// the body is plain text: line breaks become `<br>` and entities are
/// decoded a second time.
pub fn render_body(data: &str) -> String {
    let Some(text) = decode_base64_body(data) else {
        return String::new();
    };
    let decoded = decode_html_entities(&text);
    if contains_html_tags(&decoded) {
        decoded
    } else {
        decode_html_entities(&plain_text_to_html(&decoded))
    }
}

/// Replace every `cid:<content_id>` with `uri`
pub fn substitute_cid(body: &str, content_id: &str, uri: &str) -> String {
    match Regex::new(&format!("cid:{}", regex::escape(content_id))) {
        Ok(re) => re.replace_all(body, NoExpand(uri)).into_owned(),
        Err(_) => body.to_string(),
    }
}

fn clean_subject(subject: Option<&str>) -> String {
    let subject = subject.unwrap_or_default().replace('"', "");
    let subject = subject.trim();
    if subject.is_empty() {
        NO_SUBJECT.to_string()
    } else {
        subject.to_string()
    }
}

/// Internal date (ms since epoch), else the `Date` header, else now
fn received_on(internal_date: Option<&str>, headers: &[Header]) -> DateTime<Utc> {
    internal_date
        .and_then(|d| d.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .or_else(|| {
            header(headers, "Date")
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now)
}

/// Decode just enough of a raw payload to read its HTML content
///
/// Used for drafts: first `text/html` leaf if multipart, else the payload body.
pub fn draft_content(payload: &MessagePart, max_depth: usize) -> String {
    let tree = PartTree::from_payload(payload, max_depth);
    let data = if payload.parts.as_ref().is_some_and(|p| !p.is_empty()) {
        tree.first_html().and_then(|leaf| leaf.data.as_deref())
    } else {
        tree.payload_data.as_deref()
    };
    data.and_then(decode_base64_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::MessageBody;

    fn encode(s: &str) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(s)
    }

    fn leaf(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessageBody {
                data: Some(encode(text)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_plain_text_body() {
        let html = render_body(&encode("Line one\nLine &amp; two"));
        assert_eq!(html, "Line one<br>Line & two");
    }

    #[test]
    fn test_render_html_body_decodes_entities() {
        let html = render_body(&encode("<p>Tom &amp; Jerry &copy;</p>"));
        assert_eq!(html, "<p>Tom & Jerry \u{a9}</p>");
    }

    #[test]
    fn test_render_plain_text_decodes_entities_twice() {
        assert_eq!(render_body(&encode("a &amp;lt; b\nc")), "a < b<br>c");
    }

    #[test]
    fn test_render_escaped_markup_becomes_html() {
        // Tags that only appear after one entity pass are treated as markup
        assert_eq!(render_body(&encode("&lt;b&gt;bold&lt;/b&gt;")), "<b>bold</b>");
    }

    #[test]
    fn test_render_undecodable_body_is_empty() {
        assert_eq!(render_body("!!!not base64!!!"), "");
    }

    #[test]
    fn test_select_body_prefers_html_over_first_plain_part() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".into()),
            parts: Some(vec![leaf("text/plain", "plain"), leaf("text/html", "<b>html</b>")]),
            ..Default::default()
        };
        let tree = PartTree::from_payload(&payload, 8);
        assert_eq!(render_body(select_body(&tree).unwrap()), "<b>html</b>");
    }

    #[test]
    fn test_select_body_falls_back_to_first_part() {
        let payload = MessagePart {
            mime_type: Some("multipart/mixed".into()),
            parts: Some(vec![leaf("text/plain", "only plain"), leaf("image/png", "png")]),
            ..Default::default()
        };
        let tree = PartTree::from_payload(&payload, 8);
        assert_eq!(render_body(select_body(&tree).unwrap()), "only plain");
    }

    #[test]
    fn test_substitute_cid_escapes_content_id() {
        let body = r#"<img src="cid:img.1+a@x"><img src="cid:img.1+a@x">"#;
        let out = substitute_cid(body, "img.1+a@x", "data:image/png;base64,AAA");
        assert_eq!(
            out,
            r#"<img src="data:image/png;base64,AAA"><img src="data:image/png;base64,AAA">"#
        );
        // '.' must not act as a wildcard
        assert_eq!(substitute_cid("cid:imgX1+a@x", "img.1+a@x", "u"), "cid:imgX1+a@x");
    }

    #[test]
    fn test_clean_subject() {
        assert_eq!(clean_subject(Some("  \"Quarterly\" report ")), "Quarterly report");
        assert_eq!(clean_subject(Some("   ")), NO_SUBJECT);
        assert_eq!(clean_subject(None), NO_SUBJECT);
    }

    #[test]
    fn test_received_on_falls_back_to_date_header() {
        let headers = vec![Header {
            name: "Date".into(),
            value: "Tue, 1 Jul 2003 10:52:37 +0200".into(),
        }];
        let date = received_on(None, &headers);
        assert_eq!(date.timestamp(), 1057049557);

        let from_internal = received_on(Some("1700000000000"), &headers);
        assert_eq!(from_internal.timestamp(), 1700000000);
    }

    #[test]
    fn test_draft_content_prefers_html_part() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".into()),
            parts: Some(vec![leaf("text/plain", "plain"), leaf("text/html", "<p>draft</p>")]),
            ..Default::default()
        };
        assert_eq!(draft_content(&payload, 8), "<p>draft</p>");

        let single = leaf("text/html", "<p>top</p>");
        assert_eq!(draft_content(&single, 8), "<p>top</p>");
    }
}

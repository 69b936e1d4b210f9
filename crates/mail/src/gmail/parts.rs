//! Typed MIME part tree
//!
//! Gmail returns parts as one loosely-typed shape whose fields are all
//! optional. [`PartTree::from_payload`] converts that into a tree of
//! multipart containers and leaves once, at the boundary, capping nesting
//! depth. Searches walk the tree with an explicit stack.

use log::debug;

use super::api::{Header, MessagePart};
use super::content::find_header;

/// A node in the part tree
#[derive(Debug, Clone)]
pub enum PartNode {
    /// `multipart/*` container
    Multipart { children: Vec<PartNode> },
    /// Content-bearing part
    Leaf(LeafPart),
}

/// A part with content, either inline data or a provider attachment id
#[derive(Debug, Clone, Default)]
pub struct LeafPart {
    pub part_id: Option<String>,
    pub mime_type: String,
    /// Empty when the part has no filename
    pub filename: String,
    pub headers: Vec<Header>,
    /// Base64url body data, when embedded in the response
    pub data: Option<String>,
    pub attachment_id: Option<String>,
    pub size: u64,
}

impl LeafPart {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Content-ID with surrounding angle brackets removed
    pub fn content_id(&self) -> Option<String> {
        self.header("Content-ID")
            .or_else(|| self.header("X-Attachment-Id"))
            .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Whether `Content-Disposition` is `inline`
    pub fn is_inline(&self) -> bool {
        self.header("Content-Disposition")
            .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("inline"))
    }

    /// An inline part addressed by content-id; substituted into the body, never listed
    pub fn is_inline_resource(&self) -> bool {
        self.is_inline() && self.content_id().is_some()
    }

    pub fn is_mime(&self, mime: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime)
            || self
                .mime_type
                .to_ascii_lowercase()
                .starts_with(&format!("{};", mime.to_ascii_lowercase()))
    }

    fn has_data(&self) -> bool {
        self.data.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// A message's part tree plus the body data carried on the payload itself
#[derive(Debug, Clone)]
pub struct PartTree {
    pub root: PartNode,
    /// `payload.body.data`, if the provider put the body directly on the payload
    pub payload_data: Option<String>,
    pub headers: Vec<Header>,
}

impl PartTree {
    /// Default nesting cap for untrusted part trees
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    /// Convert a provider payload, dropping parts nested deeper than `max_depth`
    pub fn from_payload(payload: &MessagePart, max_depth: usize) -> Self {
        let payload_data = payload
            .body
            .as_ref()
            .and_then(|b| b.data.clone())
            .filter(|d| !d.is_empty());
        Self {
            root: convert(payload, 0, max_depth),
            payload_data,
            headers: payload.headers.clone().unwrap_or_default(),
        }
    }

    /// Leaves in depth-first pre-order
    pub fn leaves(&self) -> Vec<&LeafPart> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                PartNode::Leaf(leaf) => out.push(leaf),
                PartNode::Multipart { children } => stack.extend(children.iter().rev()),
            }
        }
        out
    }

    /// First leaf (depth-first) matching `pred`
    pub fn find_first(&self, pred: impl Fn(&LeafPart) -> bool) -> Option<&LeafPart> {
        self.leaves().into_iter().find(|leaf| pred(leaf))
    }

    /// First `text/html` leaf that carries data
    pub fn first_html(&self) -> Option<&LeafPart> {
        self.find_first(|leaf| leaf.is_mime("text/html") && leaf.has_data())
    }

    /// Body of the first top-level part, following first children down to a leaf
    pub fn first_part_data(&self) -> Option<&str> {
        let PartNode::Multipart { children } = &self.root else {
            return None;
        };
        let mut node = children.first()?;
        loop {
            match node {
                PartNode::Leaf(leaf) => return leaf.data.as_deref().filter(|d| !d.is_empty()),
                PartNode::Multipart { children } => node = children.first()?,
            }
        }
    }
}

fn convert(part: &MessagePart, depth: usize, max_depth: usize) -> PartNode {
    let mime_type = part.mime_type.clone().unwrap_or_default();
    let children = part.parts.as_deref().unwrap_or_default();

    if !children.is_empty() || mime_type.to_ascii_lowercase().starts_with("multipart/") {
        let children = if depth >= max_depth {
            debug!(
                "Dropping {} parts nested deeper than {} levels",
                children.len(),
                max_depth
            );
            Vec::new()
        } else {
            children
                .iter()
                .map(|child| convert(child, depth + 1, max_depth))
                .collect()
        };
        return PartNode::Multipart { children };
    }

    let body = part.body.clone().unwrap_or_default();
    PartNode::Leaf(LeafPart {
        part_id: part.part_id.clone(),
        mime_type,
        filename: part.filename.clone().unwrap_or_default(),
        headers: part.headers.clone().unwrap_or_default(),
        data: body.data,
        attachment_id: body.attachment_id,
        size: body.size.unwrap_or(0),
    })
}

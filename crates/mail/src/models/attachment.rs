//! Attachment model

use serde::{Deserialize, Serialize};

/// A raw MIME header (name-value pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// A downloadable message part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    /// Size declared by the provider, in bytes
    pub size: u64,
    /// Provider attachment id; `None` when the data is embedded in the part
    pub attachment_id: Option<String>,
    pub headers: Vec<HeaderPair>,
    /// Standard base64 body, present once fetched
    pub body: Option<String>,
}

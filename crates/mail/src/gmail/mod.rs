//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 token refresh and revocation
//! - The [`GmailApi`] wire-call seam and its HTTP implementation
//! - Part-tree decoding, inline resource resolution and attachments

mod attachments;
mod auth;
mod client;
pub mod content;
mod normalize;
mod parts;
mod provider;

pub use attachments::AttachmentResolver;
pub use auth::GmailAuth;
pub use client::GmailClient;
pub use normalize::{
    DecodeOptions, MessageDecoder, NO_SUBJECT, draft_content, render_body, select_body, substitute_cid,
};
pub use parts::{LeafPart, PartNode, PartTree};
pub use provider::{GmailApi, ThreadQuery};

/// Gmail API request and response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing threads
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListThreadsResponse {
        pub threads: Option<Vec<ThreadRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Thread entry in a listing
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadRef {
        pub id: String,
        pub snippet: Option<String>,
        pub history_id: Option<String>,
    }

    /// Full thread from Gmail API
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailThread {
        pub id: String,
        pub history_id: Option<String>,
        pub messages: Option<Vec<GmailMessage>>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body: inline data, or an attachment id to fetch separately
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub attachment_id: Option<String>,
        pub size: Option<u64>,
        pub data: Option<String>,
    }

    /// Message part; the message payload is itself a part
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Body of `messages.send` and the `message` field of draft requests
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawMessage {
        pub raw: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub thread_id: Option<String>,
    }

    /// Body of draft create/update/send
    #[derive(Debug, Serialize)]
    pub struct DraftBody {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        pub message: RawMessage,
    }

    /// Body of `threads.modify`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ModifyRequest {
        pub add_label_ids: Vec<String>,
        pub remove_label_ids: Vec<String>,
    }

    /// Draft as returned by the API
    #[derive(Debug, Clone, Deserialize)]
    pub struct GmailDraft {
        pub id: String,
        pub message: Option<GmailMessage>,
    }

    /// Draft entry in a listing
    #[derive(Debug, Clone, Deserialize)]
    pub struct DraftRef {
        pub id: String,
        pub message: Option<MessageRef>,
    }

    /// Response from listing drafts
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListDraftsResponse {
        pub drafts: Option<Vec<DraftRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Label color pair
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailLabelColor {
        pub background_color: Option<String>,
        pub text_color: Option<String>,
    }

    /// Label as returned by the API
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailLabel {
        pub id: String,
        pub name: String,
        #[serde(rename = "type")]
        pub label_type: Option<String>,
        pub color: Option<GmailLabelColor>,
    }

    /// Body of label create/update
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LabelBody {
        pub name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub color: Option<GmailLabelColor>,
        pub label_list_visibility: &'static str,
        pub message_list_visibility: &'static str,
    }

    /// Response from listing labels
    #[derive(Debug, Default, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<GmailLabel>>,
    }

    /// A send-as identity
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SendAs {
        pub send_as_email: String,
        pub display_name: Option<String>,
        pub is_primary: Option<bool>,
    }

    /// Response from listing send-as identities
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListSendAsResponse {
        pub send_as: Option<Vec<SendAs>>,
    }

    /// Response from the profile endpoint
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        pub messages_total: Option<u64>,
        pub threads_total: Option<u64>,
        pub history_id: Option<String>,
    }

    /// Gmail JSON error envelope: `{"error": {"code", "message", "status", "errors"}}`
    #[derive(Debug, Deserialize)]
    pub struct ApiErrorResponse {
        pub error: ApiErrorBody,
    }

    #[derive(Debug, Deserialize)]
    pub struct ApiErrorBody {
        pub message: Option<String>,
        pub status: Option<String>,
        pub errors: Option<Vec<ApiErrorDetail>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ApiErrorDetail {
        pub reason: Option<String>,
    }

    /// OAuth endpoint error: `{"error": "invalid_grant", "error_description": "..."}`
    #[derive(Debug, Deserialize)]
    pub struct OAuthErrorResponse {
        pub error: String,
        pub error_description: Option<String>,
    }
}

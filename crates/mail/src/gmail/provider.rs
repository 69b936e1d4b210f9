//! The wire-call seam between the driver and Gmail

use super::api::{
    DraftRef, GmailDraft, GmailLabel, GmailThread, LabelBody, ListDraftsResponse,
    ListThreadsResponse, MessageBody, MessageRef, ProfileResponse, SendAs,
};
use crate::error::ProviderResult;

/// Parameters for a thread or draft listing
#[derive(Debug, Clone, Default)]
pub struct ThreadQuery {
    pub label_ids: Vec<String>,
    pub q: Option<String>,
    pub max_results: u32,
    pub page_token: Option<String>,
}

/// Raw Gmail operations
///
/// [`super::GmailClient`] implements this over HTTP. The driver only
/// depends on the trait, so tests substitute an in-memory fake.
/// Implementations return provider-shaped data and raw failures; they do
/// not retry or classify.
pub trait GmailApi: Send + Sync {
    fn get_profile(&self) -> ProviderResult<ProfileResponse>;

    fn list_threads(&self, query: &ThreadQuery) -> ProviderResult<ListThreadsResponse>;

    /// Fetch a thread with `format=full`
    fn get_thread(&self, id: &str) -> ProviderResult<GmailThread>;

    fn modify_thread(&self, id: &str, add: &[String], remove: &[String]) -> ProviderResult<()>;

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> ProviderResult<MessageBody>;

    /// `messages.send` with an encoded raw document
    fn send_message(&self, raw: &str, thread_id: Option<&str>) -> ProviderResult<MessageRef>;

    fn create_draft(&self, raw: &str, thread_id: Option<&str>) -> ProviderResult<DraftRef>;

    fn update_draft(&self, id: &str, raw: &str, thread_id: Option<&str>) -> ProviderResult<DraftRef>;

    /// `drafts.send` with replacement content
    fn send_draft(&self, id: &str, raw: &str, thread_id: Option<&str>) -> ProviderResult<MessageRef>;

    fn list_drafts(&self, query: &ThreadQuery) -> ProviderResult<ListDraftsResponse>;

    /// Fetch a draft with `format=full`
    fn get_draft(&self, id: &str) -> ProviderResult<GmailDraft>;

    fn delete_draft(&self, id: &str) -> ProviderResult<()>;

    fn list_labels(&self) -> ProviderResult<Vec<GmailLabel>>;

    fn get_label(&self, id: &str) -> ProviderResult<GmailLabel>;

    fn create_label(&self, body: &LabelBody) -> ProviderResult<GmailLabel>;

    fn update_label(&self, id: &str, body: &LabelBody) -> ProviderResult<GmailLabel>;

    fn delete_label(&self, id: &str) -> ProviderResult<()>;

    fn list_send_as(&self) -> ProviderResult<Vec<SendAs>>;

    /// Revoke a token at the OAuth endpoint; `Ok(false)` when the endpoint refuses
    fn revoke_token(&self, token: &str) -> ProviderResult<bool>;
}


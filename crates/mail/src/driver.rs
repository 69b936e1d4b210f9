//! The provider-agnostic driver interface and its Gmail implementation

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::batch::{self, BatchReport};
use crate::compose::{Assembler, TransportEncoding};
use crate::config::{DriverConfig, GmailCredentials};
use crate::drafts::DraftManager;
use crate::error::{DriverError, Result};
use crate::gmail::api::{GmailLabel, GmailLabelColor, LabelBody};
use crate::gmail::content::decode_html_entities;
use crate::gmail::{AttachmentResolver, GmailApi, GmailClient, MessageDecoder, ThreadQuery};
use crate::guard::{ErrorGuard, SessionInvalidator};
use crate::models::{
    Draft, DraftId, DraftPage, DraftRequest, EmailAddress, EmailAlias, Label, LabelChanges,
    LabelColor, LabelId, LabelRequest, LabelType, MessageId, OutgoingMessage, SentMessage, Thread,
    ThreadId, ThreadPage, ThreadSummary,
};
use crate::retry;

/// Archived mail: everything outside the other system folders
const ARCHIVE_QUERY: &str = "-in:inbox -in:sent -in:drafts -in:spam -in:trash";

/// A mailbox folder to list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Bin,
    Archive,
    Starred,
    /// Any label by provider id
    Label(String),
}

impl Folder {
    /// Parse a CLI/config folder name; unknown names are treated as label ids
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" | "draft" => Self::Drafts,
            "spam" => Self::Spam,
            "bin" | "trash" => Self::Bin,
            "archive" => Self::Archive,
            "starred" => Self::Starred,
            _ => Self::Label(name.to_string()),
        }
    }

    /// Label ids and search terms selecting this folder
    fn selector(&self) -> (Vec<String>, Option<&'static str>) {
        let label = |id: &str| (vec![id.to_string()], None);
        match self {
            Self::Inbox => label(LabelId::INBOX),
            Self::Sent => label(LabelId::SENT),
            Self::Drafts => label(LabelId::DRAFTS),
            Self::Spam => label(LabelId::SPAM),
            Self::Bin => label(LabelId::TRASH),
            Self::Starred => label(LabelId::STARRED),
            Self::Archive => (Vec::new(), Some(ARCHIVE_QUERY)),
            Self::Label(id) => (vec![id.clone()], None),
        }
    }
}

/// Operations a mail provider driver offers the application
///
/// Every failure is a standardized [`DriverError`].
pub trait MailDriver: Send + Sync {
    /// One page of thread summaries in a folder
    fn list(
        &self,
        folder: &Folder,
        query: Option<&str>,
        max_results: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<ThreadPage>;

    /// A full, decoded thread
    fn get(&self, thread_id: &ThreadId) -> Result<Thread>;

    /// Send a new message
    fn create(&self, message: &OutgoingMessage) -> Result<SentMessage>;

    fn send_draft(&self, draft_id: &DraftId, message: &OutgoingMessage) -> Result<SentMessage>;

    /// Save a draft, updating in place when the request carries an id
    fn create_draft(&self, request: &DraftRequest) -> Result<DraftId>;

    fn get_draft(&self, draft_id: &DraftId) -> Result<Draft>;

    fn list_drafts(
        &self,
        query: Option<&str>,
        max_results: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<DraftPage>;

    fn delete_draft(&self, draft_id: &DraftId) -> Result<()>;

    /// Add and remove labels on many threads
    fn modify_labels(&self, thread_ids: &[ThreadId], changes: &LabelChanges) -> Result<BatchReport>;

    fn mark_as_read(&self, thread_ids: &[ThreadId]) -> Result<BatchReport> {
        self.modify_labels(thread_ids, &LabelChanges::remove(&[LabelId::UNREAD]))
    }

    fn mark_as_unread(&self, thread_ids: &[ThreadId]) -> Result<BatchReport> {
        self.modify_labels(thread_ids, &LabelChanges::add(&[LabelId::UNREAD]))
    }

    fn get_user_labels(&self) -> Result<Vec<Label>>;

    fn get_label(&self, label_id: &LabelId) -> Result<Label>;

    fn create_label(&self, request: &LabelRequest) -> Result<Label>;

    fn update_label(&self, label_id: &LabelId, request: &LabelRequest) -> Result<Label>;

    fn delete_label(&self, label_id: &LabelId) -> Result<()>;

    /// Raw bytes of one attachment
    fn get_attachment(&self, message_id: &MessageId, attachment_id: &str) -> Result<Vec<u8>>;

    /// Addresses the account can send as
    fn get_email_aliases(&self) -> Result<Vec<EmailAlias>>;

    /// Revoke a refresh token; `false` when the provider refused
    fn revoke_refresh_token(&self, token: &str) -> Result<bool>;
}

/// Gmail implementation of [`MailDriver`], scoped to one connection
pub struct GmailDriver {
    api: Arc<dyn GmailApi>,
    guard: ErrorGuard,
    config: DriverConfig,
    /// Authenticated account address, fetched from the profile on first send
    account: Mutex<Option<EmailAddress>>,
}

impl GmailDriver {
    pub fn new(api: Arc<dyn GmailApi>, config: DriverConfig, invalidator: Arc<dyn SessionInvalidator>) -> Self {
        Self {
            api,
            guard: ErrorGuard::new(invalidator),
            config,
            account: Mutex::new(None),
        }
    }

    /// Driver over the Gmail REST API for one refresh token
    pub fn connect(
        credentials: GmailCredentials,
        refresh_token: impl Into<String>,
        config: DriverConfig,
        invalidator: Arc<dyn SessionInvalidator>,
    ) -> Self {
        let client = GmailClient::new(credentials, refresh_token);
        Self::new(Arc::new(client), config, invalidator)
    }

    /// Use a known account address instead of looking it up
    pub fn with_account(self, account: EmailAddress) -> Self {
        if let Ok(mut guard) = self.account.lock() {
            *guard = Some(account);
        }
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The authenticated account's address
    pub fn account(&self) -> Result<EmailAddress> {
        if let Ok(guard) = self.account.lock()
            && let Some(account) = guard.as_ref()
        {
            return Ok(account.clone());
        }

        let profile = self
            .guard
            .run("getProfile", json!({}), || self.api.get_profile())?;
        let account = EmailAddress::new(profile.email_address);
        debug!("Resolved account address {}", account.email);
        if let Ok(mut guard) = self.account.lock() {
            *guard = Some(account.clone());
        }
        Ok(account)
    }

    fn assembler_for(&self, message: &OutgoingMessage) -> Result<Assembler> {
        let sender = match &message.from_override {
            Some(sender) => sender.clone(),
            None => self.account()?,
        };
        Ok(Assembler::new(sender))
    }

    fn drafts(&self) -> DraftManager<'_> {
        DraftManager::new(self.api.as_ref(), &self.guard, &self.config.decode)
    }

    fn page_size(&self, max_results: Option<u32>) -> u32 {
        max_results.unwrap_or(self.config.page_size)
    }
}

impl MailDriver for GmailDriver {
    fn list(
        &self,
        folder: &Folder,
        query: Option<&str>,
        max_results: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<ThreadPage> {
        let (label_ids, folder_query) = folder.selector();
        let q = [folder_query, query.map(str::trim).filter(|q| !q.is_empty())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let query = ThreadQuery {
            label_ids,
            q: Some(q).filter(|q| !q.is_empty()),
            max_results: self.page_size(max_results),
            page_token: page_token.map(str::to_string),
        };

        let context = json!({ "folder": folder, "q": query.q, "page_token": page_token });
        let listing = self
            .guard
            .run("list", context, || self.api.list_threads(&query))?;

        let threads = listing
            .threads
            .unwrap_or_default()
            .into_iter()
            .map(|t| ThreadSummary {
                id: ThreadId::new(t.id),
                snippet: t.snippet.map(|s| decode_html_entities(&s)),
                history_id: t.history_id,
            })
            .collect::<Vec<_>>();
        debug!("Listed {} threads in {:?}", threads.len(), folder);

        Ok(ThreadPage {
            threads,
            next_page_token: listing.next_page_token,
        })
    }

    fn get(&self, thread_id: &ThreadId) -> Result<Thread> {
        let id = thread_id.as_str();
        let raw = retry::with_backoff(&self.config.retry, "get", || {
            self.guard
                .run("get", json!({ "thread_id": id }), || self.api.get_thread(id))
        })?;

        let decoder = MessageDecoder::new(self.api.as_ref(), &self.guard, &self.config.decode);
        Ok(decoder.decode_thread(raw))
    }

    fn create(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        const OP: &str = "create";
        let raw = self
            .assembler_for(message)?
            .assemble(message)
            .map_err(|e| e.into_driver_error(OP))?
            .encode(TransportEncoding::UrlSafe);
        let thread_id = message.thread_id.as_ref().map(ThreadId::as_str);

        let sent = self.guard.run(OP, json!({ "thread_id": thread_id, "raw": raw }), || {
            self.api.send_message(&raw, thread_id)
        })?;

        info!("Sent message {}", sent.id);
        Ok(SentMessage {
            id: MessageId::new(sent.id),
            thread_id: sent.thread_id.map(ThreadId::new),
        })
    }

    fn send_draft(&self, draft_id: &DraftId, message: &OutgoingMessage) -> Result<SentMessage> {
        let assembler = self.assembler_for(message)?;
        self.drafts().send(&assembler, draft_id, message)
    }

    fn create_draft(&self, request: &DraftRequest) -> Result<DraftId> {
        let assembler = self.assembler_for(&request.message)?;
        self.drafts().create_or_update(&assembler, request)
    }

    fn get_draft(&self, draft_id: &DraftId) -> Result<Draft> {
        self.drafts().get(draft_id)
    }

    fn list_drafts(
        &self,
        query: Option<&str>,
        max_results: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<DraftPage> {
        self.drafts().list(query, self.page_size(max_results), page_token)
    }

    fn delete_draft(&self, draft_id: &DraftId) -> Result<()> {
        self.drafts().delete(draft_id)
    }

    fn modify_labels(&self, thread_ids: &[ThreadId], changes: &LabelChanges) -> Result<BatchReport> {
        if changes.is_empty() {
            debug!("modifyLabels: no label changes for {} threads", thread_ids.len());
            return Ok(BatchReport::default());
        }

        let ids: Vec<String> = thread_ids.iter().map(|t| t.as_str().to_string()).collect();
        batch::run("modifyLabels", &ids, &self.config.batch, |id| {
            let context = json!({ "thread_id": id, "add": changes.add, "remove": changes.remove });
            self.guard.run("modifyLabels", context, || {
                self.api.modify_thread(id, &changes.add, &changes.remove)
            })
        })
    }

    fn get_user_labels(&self) -> Result<Vec<Label>> {
        let labels = self
            .guard
            .run("getUserLabels", json!({}), || self.api.list_labels())?;
        Ok(labels.into_iter().map(to_label).collect())
    }

    fn get_label(&self, label_id: &LabelId) -> Result<Label> {
        let label = self
            .guard
            .run("getLabel", json!({ "label_id": label_id.as_str() }), || {
                self.api.get_label(label_id.as_str())
            })?;
        Ok(to_label(label))
    }

    fn create_label(&self, request: &LabelRequest) -> Result<Label> {
        const OP: &str = "createLabel";
        let body = label_body(OP, request)?;
        let label = self
            .guard
            .run(OP, json!({ "name": request.name }), || self.api.create_label(&body))?;
        info!("Created label {} ({})", label.name, label.id);
        Ok(to_label(label))
    }

    fn update_label(&self, label_id: &LabelId, request: &LabelRequest) -> Result<Label> {
        const OP: &str = "updateLabel";
        let body = label_body(OP, request)?;
        let label = self
            .guard
            .run(OP, json!({ "label_id": label_id.as_str(), "name": request.name }), || {
                self.api.update_label(label_id.as_str(), &body)
            })?;
        Ok(to_label(label))
    }

    fn delete_label(&self, label_id: &LabelId) -> Result<()> {
        self.guard
            .run("deleteLabel", json!({ "label_id": label_id.as_str() }), || {
                self.api.delete_label(label_id.as_str())
            })?;
        info!("Deleted label {}", label_id.as_str());
        Ok(())
    }

    fn get_attachment(&self, message_id: &MessageId, attachment_id: &str) -> Result<Vec<u8>> {
        AttachmentResolver::new(self.api.as_ref(), &self.guard)
            .fetch_attachment_body(message_id.as_str(), attachment_id)
    }

    fn get_email_aliases(&self) -> Result<Vec<EmailAlias>> {
        match self
            .guard
            .run("getEmailAliases", json!({}), || self.api.list_send_as())
        {
            Ok(send_as) if !send_as.is_empty() => {
                return Ok(send_as
                    .into_iter()
                    .map(|s| EmailAlias {
                        email: s.send_as_email,
                        name: s.display_name.filter(|n| !n.trim().is_empty()),
                        primary: s.is_primary.unwrap_or(false),
                    })
                    .collect());
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Falling back to the profile address for aliases: {}", e),
        }

        let account = self.account()?;
        Ok(vec![EmailAlias {
            email: account.email,
            name: account.name,
            primary: true,
        }])
    }

    fn revoke_refresh_token(&self, token: &str) -> Result<bool> {
        let revoked = self
            .guard
            .run("revokeRefreshToken", json!({ "token": token }), || {
                self.api.revoke_token(token)
            })?;
        if revoked {
            info!("Refresh token revoked");
        } else {
            warn!("Provider refused to revoke the refresh token");
        }
        Ok(revoked)
    }
}

fn to_label(label: GmailLabel) -> Label {
    let color = label.color.and_then(|c| {
        Some(LabelColor {
            background: c.background_color?,
            text: c.text_color?,
        })
    });
    Label {
        id: LabelId::new(label.id),
        name: label.name,
        label_type: LabelType::from_provider(label.label_type.as_deref()),
        color,
    }
}

fn label_body(operation: &str, request: &LabelRequest) -> Result<LabelBody> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(DriverError::validation(operation, "Label name is empty").with_code("InvalidLabel"));
    }
    Ok(LabelBody {
        name: name.to_string(),
        color: request.color.as_ref().map(|c| GmailLabelColor {
            background_color: Some(c.background.clone()),
            text_color: Some(c.text.clone()),
        }),
        label_list_visibility: "labelShow",
        message_list_visibility: "show",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_parse() {
        assert_eq!(Folder::parse("INBOX"), Folder::Inbox);
        assert_eq!(Folder::parse("trash"), Folder::Bin);
        assert_eq!(Folder::parse("Label_7"), Folder::Label("Label_7".into()));
    }

    #[test]
    fn test_folder_selector() {
        assert_eq!(Folder::Drafts.selector(), (vec!["DRAFT".to_string()], None));
        let (labels, q) = Folder::Archive.selector();
        assert!(labels.is_empty());
        assert_eq!(q, Some(ARCHIVE_QUERY));
    }

    #[test]
    fn test_to_label_requires_both_colors() {
        let label = to_label(GmailLabel {
            id: "Label_1".into(),
            name: "Work".into(),
            label_type: Some("user".into()),
            color: Some(GmailLabelColor {
                background_color: Some("#000000".into()),
                text_color: None,
            }),
        });
        assert!(label.color.is_none());
        assert_eq!(label.label_type, LabelType::User);
    }

    #[test]
    fn test_label_body_rejects_blank_name() {
        let err = label_body("createLabel", &LabelRequest::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}

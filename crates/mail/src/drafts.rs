//! Draft lifecycle: save, list, parse, send and delete

use log::{debug, info, warn};
use rayon::prelude::*;
use serde_json::json;

use crate::compose::{Assembler, TransportEncoding};
use crate::error::{DriverError, Result};
use crate::gmail::api::GmailDraft;
use crate::gmail::content::{decode_html_entities, find_header};
use crate::gmail::{DecodeOptions, GmailApi, MessageDecoder, ThreadQuery, draft_content};
use crate::guard::ErrorGuard;
use crate::models::{
    Draft, DraftId, DraftPage, DraftRequest, ListedDraft, MessageId, OutgoingMessage, SentMessage,
    ThreadId,
};

/// Draft operations for one connection
pub struct DraftManager<'a> {
    api: &'a dyn GmailApi,
    guard: &'a ErrorGuard,
    decode: &'a DecodeOptions,
}

impl<'a> DraftManager<'a> {
    pub fn new(api: &'a dyn GmailApi, guard: &'a ErrorGuard, decode: &'a DecodeOptions) -> Self {
        Self { api, guard, decode }
    }

    /// Save a draft: update in place when the request has an id, otherwise create
    pub fn create_or_update(&self, assembler: &Assembler, request: &DraftRequest) -> Result<DraftId> {
        let operation = if request.id.is_some() {
            "updateDraft"
        } else {
            "createDraft"
        };
        let raw = assembler
            .assemble_draft(&request.message)
            .map_err(|e| e.into_driver_error(operation))?
            .encode(TransportEncoding::UrlSafe);
        let thread_id = request.message.thread_id.as_ref().map(ThreadId::as_str);

        let saved = match &request.id {
            Some(id) => self.guard.run(operation, json!({ "draft_id": id.as_str() }), || {
                self.api.update_draft(id.as_str(), &raw, thread_id)
            })?,
            None => self.guard.run(operation, json!({ "thread_id": thread_id }), || {
                self.api.create_draft(&raw, thread_id)
            })?,
        };

        info!("Saved draft {} ({})", saved.id, operation);
        Ok(DraftId::new(saved.id))
    }

    /// One page of drafts, newest first
    ///
    /// Draft details are fetched concurrently. A draft whose fetch fails is
    /// skipped rather than failing the page.
    pub fn list(&self, q: Option<&str>, max_results: u32, page_token: Option<&str>) -> Result<DraftPage> {
        let query = ThreadQuery {
            label_ids: Vec::new(),
            q: q.map(str::to_string),
            max_results,
            page_token: page_token.map(str::to_string),
        };
        let listing = self.guard.run(
            "listDrafts",
            json!({ "q": q, "max_results": max_results, "page_token": page_token }),
            || self.api.list_drafts(&query),
        )?;

        let refs = listing.drafts.unwrap_or_default();
        debug!("Fetching {} drafts", refs.len());

        let decoder = MessageDecoder::new(self.api, self.guard, self.decode);
        let mut drafts: Vec<ListedDraft> = refs
            .par_iter()
            .filter_map(|draft_ref| match self.fetch(&draft_ref.id) {
                Ok(GmailDraft {
                    id,
                    message: Some(message),
                }) => Some(ListedDraft {
                    id: DraftId::new(id),
                    message: decoder.decode(message),
                }),
                Ok(_) => {
                    warn!("Skipping draft {}: no message", draft_ref.id);
                    None
                }
                Err(e) => {
                    warn!("Skipping draft {}: {}", draft_ref.id, e);
                    None
                }
            })
            .collect();

        drafts.sort_by(|a, b| b.message.received_on.cmp(&a.message.received_on));

        Ok(DraftPage {
            drafts,
            next_page_token: listing.next_page_token,
        })
    }

    /// Fetch and parse one draft
    pub fn get(&self, id: &DraftId) -> Result<Draft> {
        const OP: &str = "getDraft";
        let draft = self.fetch(id.as_str())?;

        let Some(message) = draft.message else {
            return Err(not_found(id));
        };
        let Some(payload) = message.payload.as_ref() else {
            return Err(not_found(id));
        };

        let headers = payload.headers.as_deref().unwrap_or_default();
        let recipients = |name: &str| find_header(headers, name).map(split_recipients).unwrap_or_default();

        debug!("{}: parsed draft {}", OP, draft.id);
        Ok(Draft {
            id: DraftId::new(draft.id),
            to: recipients("To"),
            cc: recipients("Cc"),
            bcc: recipients("Bcc"),
            subject: find_header(headers, "Subject")
                .map(|s| decode_html_entities(s).trim().to_string())
                .unwrap_or_default(),
            content: draft_content(payload, self.decode.max_part_depth),
            message_id: Some(MessageId::new(message.id.clone())).filter(|m| !m.as_str().is_empty()),
            thread_id: Some(ThreadId::new(message.thread_id.clone())).filter(|t| !t.as_str().is_empty()),
        })
    }

    pub fn delete(&self, id: &DraftId) -> Result<()> {
        self.guard.run("deleteDraft", json!({ "draft_id": id.as_str() }), || {
            self.api.delete_draft(id.as_str())
        })?;
        info!("Deleted draft {}", id.as_str());
        Ok(())
    }

    /// Send a draft with its final content
    ///
    /// Recipients are validated like a regular send. The raw document uses
    /// the standard base64 alphabet on this path.
    pub fn send(&self, assembler: &Assembler, id: &DraftId, message: &OutgoingMessage) -> Result<SentMessage> {
        const OP: &str = "sendDraft";
        let raw = assembler
            .assemble(message)
            .map_err(|e| e.into_driver_error(OP))?
            .encode(TransportEncoding::Standard);
        let thread_id = message.thread_id.as_ref().map(ThreadId::as_str);

        let sent = self.guard.run(OP, json!({ "draft_id": id.as_str(), "raw": raw }), || {
            self.api.send_draft(id.as_str(), &raw, thread_id)
        })?;

        info!("Sent draft {} as message {}", id.as_str(), sent.id);
        Ok(SentMessage {
            id: MessageId::new(sent.id),
            thread_id: sent.thread_id.map(ThreadId::new),
        })
    }

    fn fetch(&self, id: &str) -> Result<GmailDraft> {
        self.guard
            .run("getDraft", json!({ "draft_id": id }), || self.api.get_draft(id))
    }
}

fn not_found(id: &DraftId) -> DriverError {
    DriverError::not_found("getDraft", "DraftNotFound", format!("Draft {} has no message", id.as_str()))
        .with_context(json!({ "draft_id": id.as_str() }))
}

/// Comma-split a recipient header, dropping blank entries
fn split_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_recipients() {
        assert_eq!(
            split_recipients(" a@x.com ,, b@x.com,  "),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
        assert!(split_recipients("").is_empty());
    }
}

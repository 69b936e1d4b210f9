//! Attachment classification and lazy body fetching

use base64::prelude::*;
use log::warn;
use rayon::prelude::*;
use serde_json::json;

use super::GmailApi;
use super::content::decode_base64_bytes;
use super::parts::{LeafPart, PartTree};
use crate::error::{DriverError, ProviderError, Result};
use crate::guard::ErrorGuard;
use crate::models::{Attachment, HeaderPair};

/// Lists attachments from a part tree and fetches their content
pub struct AttachmentResolver<'a> {
    api: &'a dyn GmailApi,
    guard: &'a ErrorGuard,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(api: &'a dyn GmailApi, guard: &'a ErrorGuard) -> Self {
        Self { api, guard }
    }

    /// Parts offered to the user as attachments
    ///
    /// A part qualifies when it has a filename and is not an inline
    /// content-id resource.
    pub fn list_attachments(tree: &PartTree) -> Vec<Attachment> {
        tree.leaves()
            .into_iter()
            .filter(|leaf| is_attachment(leaf))
            .map(|leaf| Attachment {
                filename: leaf.filename.clone(),
                mime_type: if leaf.mime_type.is_empty() {
                    "application/octet-stream".to_string()
                } else {
                    leaf.mime_type.clone()
                },
                size: leaf.size,
                attachment_id: leaf.attachment_id.clone(),
                headers: leaf
                    .headers
                    .iter()
                    .map(|h| HeaderPair {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                    .collect(),
                body: leaf
                    .data
                    .as_deref()
                    .and_then(decode_base64_bytes)
                    .map(|bytes| BASE64_STANDARD.encode(bytes)),
            })
            .collect()
    }

    /// Fetch one attachment's bytes
    pub fn fetch_attachment_body(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        const OP: &str = "getAttachment";
        if attachment_id.trim().is_empty() {
            return Err(DriverError::validation(OP, "Missing attachment id")
                .with_context(json!({ "message_id": message_id })));
        }

        let context = json!({ "message_id": message_id, "attachment_id": attachment_id });
        self.guard.run(OP, context, || {
            let body = self.api.get_attachment(message_id, attachment_id)?;
            body.data
                .as_deref()
                .and_then(decode_base64_bytes)
                .ok_or_else(|| ProviderError::malformed("Attachment response has no decodable data"))
        })
    }

    /// Fill in bodies for attachments that don't have one yet
    ///
    /// Fetches run concurrently. An attachment whose fetch fails is left
    /// out of the result; the rest are returned in their original order.
    pub fn fetch_bodies(&self, message_id: &str, attachments: Vec<Attachment>) -> Vec<Attachment> {
        attachments
            .into_par_iter()
            .filter_map(|mut attachment| {
                if attachment.body.is_some() {
                    return Some(attachment);
                }
                let attachment_id = attachment.attachment_id.clone().unwrap_or_default();
                match self.fetch_attachment_body(message_id, &attachment_id) {
                    Ok(bytes) => {
                        attachment.body = Some(BASE64_STANDARD.encode(bytes));
                        Some(attachment)
                    }
                    Err(e) => {
                        warn!(
                            "Dropping attachment {:?} of message {}: {}",
                            attachment.filename, message_id, e
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

/// Attachment rule: named, and not an inline content-id resource
pub fn is_attachment(leaf: &LeafPart) -> bool {
    !leaf.filename.trim().is_empty() && !leaf.is_inline_resource()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ProviderResult;
    use crate::gmail::ThreadQuery;
    use crate::gmail::api::{
        DraftRef, GmailDraft, GmailLabel, GmailThread, LabelBody, ListDraftsResponse,
        ListThreadsResponse, MessageBody, MessageRef, ProfileResponse, SendAs,
    };
    use crate::guard::NoopInvalidator;

    /// Serves attachments by id; "broken" fails with a server error
    struct AttachmentStore;

    impl GmailApi for AttachmentStore {
        fn get_attachment(&self, _message_id: &str, attachment_id: &str) -> ProviderResult<MessageBody> {
            if attachment_id == "broken" {
                return Err(ProviderError::http(500, None, "Internal error"));
            }
            Ok(MessageBody {
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(attachment_id)),
                ..Default::default()
            })
        }

        fn get_profile(&self) -> ProviderResult<ProfileResponse> {
            unimplemented!()
        }
        fn list_threads(&self, _: &ThreadQuery) -> ProviderResult<ListThreadsResponse> {
            unimplemented!()
        }
        fn get_thread(&self, _: &str) -> ProviderResult<GmailThread> {
            unimplemented!()
        }
        fn modify_thread(&self, _: &str, _: &[String], _: &[String]) -> ProviderResult<()> {
            unimplemented!()
        }
        fn send_message(&self, _: &str, _: Option<&str>) -> ProviderResult<MessageRef> {
            unimplemented!()
        }
        fn create_draft(&self, _: &str, _: Option<&str>) -> ProviderResult<DraftRef> {
            unimplemented!()
        }
        fn update_draft(&self, _: &str, _: &str, _: Option<&str>) -> ProviderResult<DraftRef> {
            unimplemented!()
        }
        fn send_draft(&self, _: &str, _: &str, _: Option<&str>) -> ProviderResult<MessageRef> {
            unimplemented!()
        }
        fn list_drafts(&self, _: &ThreadQuery) -> ProviderResult<ListDraftsResponse> {
            unimplemented!()
        }
        fn get_draft(&self, _: &str) -> ProviderResult<GmailDraft> {
            unimplemented!()
        }
        fn delete_draft(&self, _: &str) -> ProviderResult<()> {
            unimplemented!()
        }
        fn list_labels(&self) -> ProviderResult<Vec<GmailLabel>> {
            unimplemented!()
        }
        fn get_label(&self, _: &str) -> ProviderResult<GmailLabel> {
            unimplemented!()
        }
        fn create_label(&self, _: &LabelBody) -> ProviderResult<GmailLabel> {
            unimplemented!()
        }
        fn update_label(&self, _: &str, _: &LabelBody) -> ProviderResult<GmailLabel> {
            unimplemented!()
        }
        fn delete_label(&self, _: &str) -> ProviderResult<()> {
            unimplemented!()
        }
        fn list_send_as(&self) -> ProviderResult<Vec<SendAs>> {
            unimplemented!()
        }
        fn revoke_token(&self, _: &str) -> ProviderResult<bool> {
            unimplemented!()
        }
    }

    fn pending(id: &str) -> Attachment {
        Attachment {
            filename: format!("{}.bin", id),
            mime_type: "application/octet-stream".into(),
            size: 3,
            attachment_id: Some(id.into()),
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn test_fetch_bodies_skips_failed_fetch() {
        let guard = ErrorGuard::new(Arc::new(NoopInvalidator));
        let resolver = AttachmentResolver::new(&AttachmentStore, &guard);

        let fetched = resolver.fetch_bodies("m1", vec![pending("a"), pending("broken"), pending("c")]);

        let ids: Vec<_> = fetched.iter().filter_map(|a| a.attachment_id.as_deref()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(fetched[0].body.as_deref(), Some(BASE64_STANDARD.encode("a").as_str()));
        assert_eq!(fetched[1].body.as_deref(), Some(BASE64_STANDARD.encode("c").as_str()));
    }

    #[test]
    fn test_fetch_attachment_body_requires_id() {
        let guard = ErrorGuard::new(Arc::new(NoopInvalidator));
        let resolver = AttachmentResolver::new(&AttachmentStore, &guard);

        let err = resolver.fetch_attachment_body("m1", "  ").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}

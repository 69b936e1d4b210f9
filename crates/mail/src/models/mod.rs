//! Domain models for mail entities

mod attachment;
mod draft;
mod label;
mod message;
mod thread;

pub use attachment::{Attachment, HeaderPair};
pub use draft::{
    Draft, DraftId, DraftPage, DraftRequest, EmailAlias, ListedDraft, OutgoingAttachment,
    OutgoingMessage, SentMessage,
};
pub use label::{Label, LabelChanges, LabelColor, LabelId, LabelRequest, LabelType};
pub use message::{EmailAddress, Message, MessageBuilder, MessageId, Tag};
pub use thread::{Thread, ThreadId, ThreadPage, ThreadSummary};

//! Courier mail crate - Gmail provider driver
//!
//! This crate adapts Gmail's nested message representation into normalized
//! threads and performs mutations against the provider:
//! - Domain models (Thread, Message, Label, Draft, OutgoingMessage)
//! - Gmail API client and OAuth authentication
//! - Message decoding with inline resource resolution and attachments
//! - Outgoing MIME assembly
//! - Chunked batch label mutations
//! - Draft lifecycle
//! - Error classification with session invalidation on fatal auth errors
//!
//! All I/O is blocking; concurrency is bounded rayon parallelism.

pub mod batch;
pub mod compose;
pub mod config;
pub mod drafts;
pub mod driver;
pub mod error;
pub mod gmail;
pub mod guard;
pub mod models;
pub mod retry;

pub use batch::{BatchOptions, BatchReport, FailurePolicy, ItemOutcome};
pub use compose::{AssembledMessage, Assembler, ComposeError, TransportEncoding};
pub use config::{DriverConfig, GmailCredentials};
pub use driver::{Folder, GmailDriver, MailDriver};
pub use error::{DriverError, ErrorKind, ProviderError};
pub use gmail::{DecodeOptions, GmailApi, GmailAuth, GmailClient, api::ProfileResponse};
pub use guard::{ErrorGuard, NoopInvalidator, SessionInvalidator};
pub use models::{
    Attachment, Draft, DraftId, DraftPage, DraftRequest, EmailAddress, EmailAlias, Label,
    LabelChanges, LabelColor, LabelId, LabelRequest, LabelType, ListedDraft, Message, MessageId,
    OutgoingAttachment, OutgoingMessage, SentMessage, Tag, Thread, ThreadId, ThreadPage,
    ThreadSummary,
};
pub use retry::RetryPolicy;

//! Error types
//!
//! [`ProviderError`] is what the wire client returns. Every public driver
//! operation converts failures into the standardized [`DriverError`]
//! envelope, mostly through [`crate::guard::ErrorGuard`].

use serde::Serialize;
use serde_json::Value;

/// A failed call against the provider's wire protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status, `None` for transport-level failures
    pub status: Option<u16>,
    /// Provider error code (`invalid_grant`, `rateLimitExceeded`, ...)
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            message: message.into(),
        }
    }

    /// Network failure before any HTTP status was received
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// A response that could not be parsed
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: Some("malformed_response".to_string()),
            message: message.into(),
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The stored credential is permanently invalid; the session was torn down
    FatalAuth,
    /// Network or rate-limit failure
    Transient,
    /// Bad input (empty recipients, missing attachment id, ...)
    Validation,
    /// Draft, thread or label absent
    NotFound,
    /// Some batch items failed under an all-or-nothing policy
    PartialBatchFailure,
    /// Any other provider rejection
    Provider,
}

/// Standardized error envelope returned by every driver operation
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct DriverError {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider error code, when one was reported
    pub code: Option<String>,
    /// Name of the attempted operation
    pub operation: String,
    /// Call context with sensitive keys redacted
    pub context: Value,
}

impl DriverError {
    pub fn new(kind: ErrorKind, operation: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            operation: operation.to_string(),
            context: Value::Null,
        }
    }

    pub fn validation(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, operation, message)
    }

    pub fn not_found(operation: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, operation, message).with_code(code)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::FatalAuth
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

//! Error classification around provider calls
//!
//! Every provider call made by the driver goes through [`ErrorGuard::run`].
//! Failures are classified, logged with a redacted context and converted
//! into a [`DriverError`]. Fatal credential errors additionally invoke the
//! injected [`SessionInvalidator`] before the error is returned.

use std::sync::Arc;

use log::{error, warn};
use serde_json::{Map, Value};

use crate::error::{DriverError, ErrorKind, ProviderError, ProviderResult, Result};

/// Marker substituted for sensitive values in logged contexts
pub const REDACTED: &str = "[REDACTED]";

/// Codes and messages meaning the stored grant can never work again
const FATAL_ERRORS: &[&str] = &[
    "invalid_grant",
    "invalid_client",
    "unauthorized_client",
    "token has been expired or revoked",
];

const SENSITIVE_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "client_secret",
    "code",
    "password",
    "raw",
    "refresh_token",
    "token",
];

/// Tears down the active connection when its credential is permanently invalid
pub trait SessionInvalidator: Send + Sync {
    fn invalidate(&self, error: &DriverError);
}

/// Invalidator that does nothing, for callers without a session store
pub struct NoopInvalidator;

impl SessionInvalidator for NoopInvalidator {
    fn invalidate(&self, _error: &DriverError) {}
}

/// Wraps provider calls with classification, logging and session invalidation
#[derive(Clone)]
pub struct ErrorGuard {
    invalidator: Arc<dyn SessionInvalidator>,
}

impl ErrorGuard {
    pub fn new(invalidator: Arc<dyn SessionInvalidator>) -> Self {
        Self { invalidator }
    }

    /// Invoke `call`, standardizing any failure
    ///
    /// `context` describes the call (ids, query, ...) and is redacted before
    /// it is logged or attached to the error.
    pub fn run<T>(
        &self,
        operation: &str,
        context: Value,
        call: impl FnOnce() -> ProviderResult<T>,
    ) -> Result<T> {
        call().map_err(|e| self.standardize(operation, &context, e))
    }

    /// Classify a provider failure and produce the standardized error
    pub fn standardize(&self, operation: &str, context: &Value, err: ProviderError) -> DriverError {
        let kind = classify(&err);
        let mut driver_err = DriverError::new(kind, operation, err.message.clone())
            .with_context(redact(context));
        driver_err.code = err.code.clone();

        if kind == ErrorKind::FatalAuth {
            error!(
                "{} failed with fatal auth error ({}): {}; invalidating session, context={}",
                operation,
                driver_err.code.as_deref().unwrap_or("-"),
                driver_err.message,
                driver_err.context
            );
            self.invalidator.invalidate(&driver_err);
        } else {
            warn!(
                "{} failed [{:?}] status={:?} code={}: {} context={}",
                operation,
                kind,
                err.status,
                driver_err.code.as_deref().unwrap_or("-"),
                driver_err.message,
                driver_err.context
            );
        }

        driver_err
    }
}

impl Default for ErrorGuard {
    fn default() -> Self {
        Self::new(Arc::new(NoopInvalidator))
    }
}

/// Map a provider failure onto the error taxonomy
pub fn classify(err: &ProviderError) -> ErrorKind {
    if is_fatal(err) {
        return ErrorKind::FatalAuth;
    }
    match err.status {
        None if err.code.as_deref() == Some("malformed_response") => ErrorKind::Provider,
        None => ErrorKind::Transient,
        Some(404) => ErrorKind::NotFound,
        Some(400) => ErrorKind::Validation,
        Some(408) | Some(429) => ErrorKind::Transient,
        Some(403) if is_rate_limit_code(err.code.as_deref()) => ErrorKind::Transient,
        Some(s) if s >= 500 => ErrorKind::Transient,
        Some(_) => ErrorKind::Provider,
    }
}

fn is_fatal(err: &ProviderError) -> bool {
    let code = err.code.as_deref().unwrap_or_default().to_lowercase();
    let message = err.message.to_lowercase();
    FATAL_ERRORS
        .iter()
        .any(|f| code == *f || message.contains(f))
}

fn is_rate_limit_code(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("rateLimitExceeded") | Some("userRateLimitExceeded") | Some("RESOURCE_EXHAUSTED")
    )
}

/// Replace sensitive values anywhere in a JSON context
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let sensitive = SENSITIVE_KEYS
                    .iter()
                    .any(|k| key.eq_ignore_ascii_case(k));
                if sensitive {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInvalidator(AtomicUsize);

    impl SessionInvalidator for CountingInvalidator {
        fn invalidate(&self, _error: &DriverError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fatal_error_invalidates_session() {
        let invalidator = Arc::new(CountingInvalidator::default());
        let guard = ErrorGuard::new(invalidator.clone());

        let err = guard
            .run("get", json!({"thread_id": "t1"}), || -> ProviderResult<()> {
                Err(ProviderError::http(
                    400,
                    Some("invalid_grant".into()),
                    "Token has been expired or revoked.",
                ))
            })
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::FatalAuth);
        assert_eq!(err.code.as_deref(), Some("invalid_grant"));
        assert_eq!(err.operation, "get");
        assert_eq!(invalidator.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_error_does_not_invalidate() {
        let invalidator = Arc::new(CountingInvalidator::default());
        let guard = ErrorGuard::new(invalidator.clone());

        let err = guard
            .run("list", Value::Null, || -> ProviderResult<()> {
                Err(ProviderError::http(503, None, "backend error"))
            })
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(invalidator.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classify_statuses() {
        assert_eq!(classify(&ProviderError::http(404, None, "nope")), ErrorKind::NotFound);
        assert_eq!(classify(&ProviderError::http(429, None, "slow")), ErrorKind::Transient);
        assert_eq!(
            classify(&ProviderError::http(403, Some("rateLimitExceeded".into()), "slow")),
            ErrorKind::Transient
        );
        assert_eq!(classify(&ProviderError::http(403, None, "forbidden")), ErrorKind::Provider);
        assert_eq!(classify(&ProviderError::transport("reset")), ErrorKind::Transient);
        assert_eq!(classify(&ProviderError::malformed("bad json")), ErrorKind::Provider);
    }

    #[test]
    fn test_redact_nested_sensitive_keys() {
        let context = json!({
            "thread_id": "t1",
            "refresh_token": "secret",
            "request": { "raw": "base64", "Authorization": "Bearer x" },
            "items": [{ "code": "123" }]
        });

        let redacted = redact(&context);
        assert_eq!(redacted["thread_id"], "t1");
        assert_eq!(redacted["refresh_token"], REDACTED);
        assert_eq!(redacted["request"]["raw"], REDACTED);
        assert_eq!(redacted["request"]["Authorization"], REDACTED);
        assert_eq!(redacted["items"][0]["code"], REDACTED);
    }

    #[test]
    fn test_error_context_is_redacted() {
        let guard = ErrorGuard::default();
        let err = guard
            .run("send", json!({"raw": "abc"}), || -> ProviderResult<()> {
                Err(ProviderError::http(500, None, "boom"))
            })
            .unwrap_err();
        assert_eq!(err.context["raw"], REDACTED);
    }
}

//! Exponential backoff for idempotent reads
//!
//! Only transient failures are retried. Mutations and sends never go
//! through here so a retry can't duplicate a side effect.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
        }
    }
}

/// Run `op`, retrying transient errors with exponential backoff and jitter
pub fn with_backoff<T>(policy: &RetryPolicy, operation: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut delay = Duration::from_millis(policy.initial_delay_ms);

    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let wait = delay + Duration::from_millis(rand_jitter());
                debug!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    operation, attempt, attempts, e.message, wait
                );
                std::thread::sleep(wait);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverError, ErrorKind};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
        }
    }

    #[test]
    fn test_retries_transient_until_success() {
        let mut calls = 0;
        let result = with_backoff(&quick(), "get", || {
            calls += 1;
            if calls < 3 {
                Err(DriverError::new(ErrorKind::Transient, "get", "503"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = with_backoff(&quick(), "get", || {
            calls += 1;
            Err(DriverError::new(ErrorKind::Transient, "get", "503"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_does_not_retry_non_transient() {
        let mut calls = 0;
        let result: Result<()> = with_backoff(&quick(), "get", || {
            calls += 1;
            Err(DriverError::new(ErrorKind::NotFound, "get", "404"))
        });
        assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(calls, 1);
    }
}

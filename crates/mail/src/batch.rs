//! Chunked bulk mutations
//!
//! Ids are split into fixed-size chunks. Items within a chunk run
//! concurrently on a pool sized to the chunk (capped at
//! [`MAX_CHUNK_CONCURRENCY`]); chunks run one after another
//! with a fixed pause between them to stay under provider rate limits.

use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{DriverError, ErrorKind, Result};

/// Upper bound on concurrent calls per chunk, whatever the chunk size
pub const MAX_CHUNK_CONCURRENCY: usize = 64;

/// What a batch reports when some items fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log failures and report success; callers inspect the report
    #[default]
    BestEffort,
    /// Any failed item fails the whole batch with the failed ids attached
    AllOrNothing,
}

/// Batch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub chunk_size: usize,
    /// Pause between consecutive chunks
    pub chunk_delay_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: 15,
            chunk_delay_ms: 100,
            failure_policy: FailurePolicy::BestEffort,
        }
    }
}

/// Result of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    /// Failure message, `None` on success
    pub error: Option<String>,
}

/// Per-item results of a batch, in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub chunks: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.len() - self.failed_count()
    }
}

/// Apply `op` to every id
///
/// An empty id list returns immediately without invoking `op`. One item's
/// failure never stops the others; how failures surface depends on the
/// [`FailurePolicy`].
pub fn run<F>(operation: &str, ids: &[String], options: &BatchOptions, op: F) -> Result<BatchReport>
where
    F: Fn(&str) -> Result<()> + Sync,
{
    if ids.is_empty() {
        debug!("{}: no ids, nothing to do", operation);
        return Ok(BatchReport::default());
    }

    let chunk_size = options.chunk_size.max(1);
    let delay = Duration::from_millis(options.chunk_delay_ms);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunk_size.min(MAX_CHUNK_CONCURRENCY))
        .thread_name(|i| format!("batch-{}", i))
        .build();
    if let Err(e) = &pool {
        warn!("{}: falling back to the global pool: {}", operation, e);
    }

    let mut report = BatchReport::default();
    for (index, chunk) in ids.chunks(chunk_size).enumerate() {
        if index > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let run_chunk = || -> Vec<ItemOutcome> {
            chunk
                .par_iter()
                .map(|id| ItemOutcome {
                    id: id.clone(),
                    error: op(id).err().map(|e| e.message),
                })
                .collect()
        };
        let outcomes = match &pool {
            Ok(pool) => pool.install(run_chunk),
            Err(_) => run_chunk(),
        };

        debug!(
            "{}: chunk {} done ({} items)",
            operation,
            index + 1,
            outcomes.len()
        );
        report.outcomes.extend(outcomes);
        report.chunks += 1;
    }

    let failed = report.failed_count();
    if failed == 0 {
        info!(
            "{}: {} items succeeded in {} chunks",
            operation,
            report.outcomes.len(),
            report.chunks
        );
        return Ok(report);
    }

    let failed_ids: Vec<&str> = report.failed().map(|o| o.id.as_str()).collect();
    warn!(
        "{}: {} of {} items failed: {:?}",
        operation,
        failed,
        report.outcomes.len(),
        failed_ids
    );

    match options.failure_policy {
        FailurePolicy::BestEffort => Ok(report),
        FailurePolicy::AllOrNothing => Err(DriverError::new(
            ErrorKind::PartialBatchFailure,
            operation,
            format!("{} of {} items failed", failed, report.outcomes.len()),
        )
        .with_code("PartialBatchFailure")
        .with_context(json!({
            "failed": failed_ids,
            "succeeded": report.succeeded_count(),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    fn options(delay_ms: u64, policy: FailurePolicy) -> BatchOptions {
        BatchOptions {
            chunk_size: 15,
            chunk_delay_ms: delay_ms,
            failure_policy: policy,
        }
    }

    #[test]
    fn test_empty_ids_never_call_op() {
        let calls = AtomicUsize::new(0);
        let report = run("modify", &[], &BatchOptions::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.chunks, 0);
    }

    #[test]
    fn test_chunks_and_every_id_called_once() {
        let seen = Mutex::new(Vec::new());
        let report = run("modify", &ids(31), &options(0, FailurePolicy::BestEffort), |id| {
            seen.lock().unwrap().push(id.to_string());
            Ok(())
        })
        .unwrap();

        assert_eq!(report.chunks, 3);
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        let mut expected = ids(31);
        expected.sort();
        assert_eq!(seen, expected);
        // report keeps input order
        assert_eq!(report.outcomes[30].id, "t30");
    }

    #[test]
    fn test_pause_between_chunks_only() {
        let start = Instant::now();
        run("modify", &ids(31), &options(30, FailurePolicy::BestEffort), |_| Ok(())).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));

        let start = Instant::now();
        run("modify", &ids(15), &options(500, FailurePolicy::BestEffort), |_| Ok(())).unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_oversized_chunk_caps_concurrency() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let options = BatchOptions {
            chunk_size: 10_000,
            chunk_delay_ms: 0,
            failure_policy: FailurePolicy::BestEffort,
        };
        let report = run("modify", &ids(200), &options, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert_eq!(report.chunks, 1);
        assert_eq!(report.succeeded_count(), 200);
        assert!(peak.load(Ordering::SeqCst) <= MAX_CHUNK_CONCURRENCY);
    }

    #[test]
    fn test_best_effort_isolates_failures() {
        let report = run("modify", &ids(20), &options(0, FailurePolicy::BestEffort), |id| {
            if id == "t3" || id == "t17" {
                Err(DriverError::new(ErrorKind::Transient, "modify", "boom"))
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.succeeded_count(), 18);
        let failed: Vec<&str> = report.failed().map(|o| o.id.as_str()).collect();
        assert_eq!(failed, vec!["t3", "t17"]);
    }

    #[test]
    fn test_all_or_nothing_reports_failed_ids() {
        let calls = AtomicUsize::new(0);
        let err = run("modify", &ids(20), &options(0, FailurePolicy::AllOrNothing), |id| {
            calls.fetch_add(1, Ordering::SeqCst);
            if id == "t0" {
                Err(DriverError::new(ErrorKind::Provider, "modify", "nope"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PartialBatchFailure);
        assert_eq!(err.context["failed"], json!(["t0"]));
        assert_eq!(err.context["succeeded"], json!(19));
        // the failure didn't stop the rest
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }
}

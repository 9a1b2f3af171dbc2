//! Progress reporting for import pipelines
//!
//! Counts passed, skipped and failed records and keeps the failures for the
//! final report. Shared between stages through `Arc`; every recording
//! operation takes `&self` so parallel writers can use it.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// A record that failed, with the reason
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub record: serde_json::Value,
    pub error: String,
}

/// Snapshot of a reporter
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub passed: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Captured failures, at most `max_captured_failures`
    pub failures: Vec<FailedRecord>,
}

impl ReportSummary {
    pub fn total(&self) -> u64 {
        self.passed + self.skipped + self.failed
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} passed, {} skipped, {} failed",
            self.total(),
            self.passed,
            self.skipped,
            self.failed
        )
    }
}

/// Pass/skip/fail tally of one pipeline run
#[derive(Debug)]
pub struct ProgressReporter {
    name: String,
    passed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    failures: Mutex<Vec<FailedRecord>>,
    max_captured_failures: usize,
    progress_interval: u64,
    reported: AtomicBool,
    started: Instant,
}

impl ProgressReporter {
    /// Reporter named after the pipeline it tracks (`owners`, `housings`, ...)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
            max_captured_failures: 1000,
            progress_interval: 10_000,
            reported: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Log a progress line every `interval` records (0 disables)
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Keep at most `max` failures in memory
    pub fn with_max_captured_failures(mut self, max: usize) -> Self {
        self.max_captured_failures = max;
        self
    }

    pub fn passed<R: Serialize + ?Sized>(&self, _record: &R) {
        self.passed.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    pub fn skipped<R: Serialize + ?Sized>(&self, _record: &R) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    pub fn failed<R: Serialize + ?Sized>(&self, record: &R, error: &dyn fmt::Display) {
        self.failed.fetch_add(1, Ordering::Relaxed);

        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        if failures.len() < self.max_captured_failures {
            failures.push(FailedRecord {
                record: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
                error: error.to_string(),
            });
        }
        drop(failures);

        self.tick();
    }

    fn tick(&self) {
        if self.progress_interval == 0 {
            return;
        }
        let total = self.passed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed);
        if total % self.progress_interval == 0 {
            info!(
                pipeline = %self.name,
                processed = total,
                elapsed_s = self.started.elapsed().as_secs(),
                "Import progress"
            );
        }
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            passed: self.passed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            failures: self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Log the final summary and captured failures
    ///
    /// Only the first call logs; the interrupt path and normal completion may
    /// both call it.
    pub fn report(&self) -> ReportSummary {
        let summary = self.summary();
        if self.reported.swap(true, Ordering::SeqCst) {
            return summary;
        }

        for failure in &summary.failures {
            warn!(
                pipeline = %self.name,
                error = %failure.error,
                record = %failure.record,
                "Record failed"
            );
        }
        if summary.failed > summary.failures.len() as u64 {
            warn!(
                pipeline = %self.name,
                omitted = summary.failed - summary.failures.len() as u64,
                "Further failures not captured"
            );
        }

        info!(
            pipeline = %self.name,
            passed = summary.passed,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_s = self.started.elapsed().as_secs(),
            "Import finished: {}",
            summary
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_counts_and_captured_failures() {
        let reporter = ProgressReporter::new("owners").with_max_captured_failures(1);

        reporter.passed(&json!({"id": 1}));
        reporter.skipped(&json!({"id": 2}));
        reporter.failed(&json!({"id": 3}), &"bad date");
        reporter.failed(&json!({"id": 4}), &"bad rank");

        let summary = reporter.summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].record, json!({"id": 3}));
        assert_eq!(summary.failures[0].error, "bad date");
        assert_eq!(summary.to_string(), "4 records: 1 passed, 1 skipped, 2 failed");
    }

    #[test]
    fn test_report_is_idempotent() {
        let reporter = ProgressReporter::new("housings");
        reporter.passed(&json!({}));

        let first = reporter.report();
        let second = reporter.report();
        assert_eq!(first.passed, 1);
        assert_eq!(second.passed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let reporter = Arc::new(ProgressReporter::new("buildings").with_progress_interval(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reporter = Arc::clone(&reporter);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    if i % 10 == 0 {
                        reporter.failed(&i, &"boom");
                    } else {
                        reporter.passed(&i);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = reporter.summary();
        assert_eq!(summary.passed, 720);
        assert_eq!(summary.failed, 80);
        assert_eq!(summary.total(), 800);
    }
}

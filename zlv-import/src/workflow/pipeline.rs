//! Pipeline driver
//!
//! Pulls typed records one at a time, asks the processor for a decision,
//! applies it in a transaction unless running dry, and reports exactly one
//! outcome per record. The report is always flushed before returning.

use super::Change;
use crate::error::{ImportError, ImportResult};
use crate::reporter::{ProgressReporter, ReportSummary};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Per-record decision maker
#[async_trait]
pub trait Processor: Send + Sync {
    type Record: Serialize + Send + Sync + 'static;

    /// Pipeline name used in logs (`owners`, `housings`, ...)
    fn name(&self) -> &'static str;

    /// Look up current state and decide what to write
    ///
    /// `Ok(None)` means the record needs no write and counts as skipped.
    async fn decide(&self, record: &Self::Record) -> ImportResult<Option<Change>>;

    /// Called after `change` has been committed; never in dry-run mode
    fn committed(&self, _change: &Change) {}
}

/// Decision maker over chunks of records
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    type Record: Serialize + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn decide_batch(&self, records: &[Self::Record]) -> ImportResult<Option<Change>>;
}

/// Everything a pipeline run shares
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub pool: SqlitePool,
    pub reporter: Arc<ProgressReporter>,
    /// Decide but never write
    pub dry_run: bool,
    /// Stop at the first failed record
    pub abort_early: bool,
    pub max_lock_wait_ms: u64,
    pub cancel: CancellationToken,
}

impl PipelineContext {
    pub fn new(pool: SqlitePool, reporter: Arc<ProgressReporter>) -> Self {
        Self {
            pool,
            reporter,
            dry_run: false,
            abort_early: false,
            max_lock_wait_ms: 5000,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_abort_early(mut self, abort_early: bool) -> Self {
        self.abort_early = abort_early;
        self
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply a change in its own transaction, retrying on lock contention
    ///
    /// Does nothing in dry-run mode.
    pub async fn apply(&self, change: &Change) -> ImportResult<()> {
        if self.dry_run {
            debug!(change = change.label(), "Dry run, change not applied");
            return Ok(());
        }

        let pool = &self.pool;
        retry_on_lock(change.label(), self.max_lock_wait_ms, move || async move {
            let mut tx = pool.begin().await?;
            change.apply(&mut tx).await?;
            tx.commit().await?;
            Ok::<(), ImportError>(())
        })
        .await
    }
}

/// Next item, or `None` once the stream ends or the run is cancelled
async fn next_or_cancel<S>(records: &mut S, cancel: &CancellationToken) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = records.next() => item,
    }
}

async fn process_record<P: Processor>(processor: &P, ctx: &PipelineContext, record: &P::Record) -> ImportResult<bool> {
    match processor.decide(record).await? {
        Some(change) => {
            ctx.apply(&change).await?;
            if !ctx.dry_run {
                processor.committed(&change);
            }
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Run one record-at-a-time pipeline to completion
///
/// Errors yielded by `records` end the run: validation failures only surface
/// there in abort-early mode (already reported), anything else is a read
/// error. Returns `ImportError::Cancelled` when interrupted.
pub async fn run_pipeline<P, S>(records: S, processor: &P, ctx: &PipelineContext) -> ImportResult<ReportSummary>
where
    P: Processor,
    S: Stream<Item = ImportResult<P::Record>> + Send,
{
    let span = info_span!("pipeline", pipeline = processor.name(), dry_run = ctx.dry_run);

    async move {
        info!("Pipeline started");
        let mut records = std::pin::pin!(records);

        let outcome = loop {
            let Some(item) = next_or_cancel(&mut records, &ctx.cancel).await else {
                break if ctx.cancel.is_cancelled() {
                    Err(ImportError::Cancelled)
                } else {
                    Ok(())
                };
            };

            let record = match item {
                Ok(record) => record,
                Err(err) => break Err(err),
            };

            match process_record(processor, ctx, &record).await {
                Ok(true) => ctx.reporter.passed(&record),
                Ok(false) => ctx.reporter.skipped(&record),
                Err(err) => {
                    warn!(error = %err, "Record failed");
                    ctx.reporter.failed(&record, &err);
                    if ctx.abort_early {
                        break Err(err);
                    }
                }
            }
        };

        let summary = ctx.reporter.report();
        outcome.map(|()| summary)
    }
    .instrument(span)
    .await
}

/// Run a chunked pipeline: one decision and one write per `chunk_size` records
///
/// Every record of an applied chunk is passed; a failing chunk marks all of
/// its records failed.
pub async fn run_batched_pipeline<P, S>(
    records: S,
    processor: &P,
    chunk_size: usize,
    ctx: &PipelineContext,
) -> ImportResult<ReportSummary>
where
    P: BatchProcessor,
    S: Stream<Item = ImportResult<P::Record>> + Send,
{
    let span = info_span!("pipeline", pipeline = processor.name(), dry_run = ctx.dry_run, chunk_size);

    async move {
        info!("Pipeline started");
        let mut chunks = std::pin::pin!(records.chunks(chunk_size.max(1)));

        let outcome = loop {
            let Some(chunk) = next_or_cancel(&mut chunks, &ctx.cancel).await else {
                break if ctx.cancel.is_cancelled() {
                    Err(ImportError::Cancelled)
                } else {
                    Ok(())
                };
            };

            let mut batch = Vec::with_capacity(chunk.len());
            let mut stream_error = None;
            for item in chunk {
                match item {
                    Ok(record) => batch.push(record),
                    Err(err) => {
                        stream_error = Some(err);
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                let result = match processor.decide_batch(&batch).await {
                    Ok(Some(change)) => ctx.apply(&change).await.map(|()| true),
                    Ok(None) => Ok(false),
                    Err(err) => Err(err),
                };

                match result {
                    Ok(true) => batch.iter().for_each(|record| ctx.reporter.passed(record)),
                    Ok(false) => batch.iter().for_each(|record| ctx.reporter.skipped(record)),
                    Err(err) => {
                        warn!(error = %err, records = batch.len(), "Chunk failed");
                        batch.iter().for_each(|record| ctx.reporter.failed(record, &err));
                        if ctx.abort_early {
                            break Err(err);
                        }
                    }
                }
            }

            if let Some(err) = stream_error {
                break Err(err);
            }
        };

        let summary = ctx.reporter.report();
        outcome.map(|()| summary)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde::Serialize;
    use zlv_common::db::init_memory_database;

    #[derive(Debug, Serialize)]
    struct Item(i64);

    /// Even items need a write, odd ones are skipped, negative ones fail
    struct ParityProcessor;

    #[async_trait]
    impl Processor for ParityProcessor {
        type Record = Item;

        fn name(&self) -> &'static str {
            "parity"
        }

        async fn decide(&self, record: &Item) -> ImportResult<Option<Change>> {
            if record.0 < 0 {
                return Err(ImportError::MissingReference(format!("item {}", record.0)));
            }
            Ok((record.0 % 2 == 0).then(|| Change::SaveBuildings(Vec::new())))
        }
    }

    fn items(values: &[i64]) -> impl Stream<Item = ImportResult<Item>> + Send {
        stream::iter(values.iter().map(|v| Ok(Item(*v))).collect::<Vec<_>>())
    }

    async fn context() -> PipelineContext {
        let pool = init_memory_database().await.unwrap();
        PipelineContext::new(pool, Arc::new(ProgressReporter::new("parity")))
    }

    #[tokio::test]
    async fn test_one_outcome_per_record() {
        let ctx = context().await;
        let summary = run_pipeline(items(&[2, 3, -1, 4]), &ParityProcessor, &ctx).await.unwrap();

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].record, serde_json::json!(-1));
    }

    #[tokio::test]
    async fn test_abort_early_stops_at_first_failure() {
        let ctx = context().await.with_abort_early(true);
        let result = run_pipeline(items(&[2, -1, 4]), &ParityProcessor, &ctx).await;

        assert!(matches!(result, Err(ImportError::MissingReference(_))));
        let summary = ctx.reporter.summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = context().await;
        ctx.cancel.cancel();

        let result = run_pipeline(items(&[2, 4]), &ParityProcessor, &ctx).await;

        assert!(matches!(result, Err(ImportError::Cancelled)));
        assert_eq!(ctx.reporter.summary().total(), 0);
    }

    struct CountingBatches;

    #[async_trait]
    impl BatchProcessor for CountingBatches {
        type Record = Item;

        fn name(&self) -> &'static str {
            "batches"
        }

        async fn decide_batch(&self, records: &[Item]) -> ImportResult<Option<Change>> {
            if records.iter().any(|r| r.0 < 0) {
                return Err(ImportError::InvalidInput("negative".to_string()));
            }
            Ok(Some(Change::SaveBuildings(Vec::new())))
        }
    }

    #[tokio::test]
    async fn test_failing_chunk_fails_all_its_records() {
        let ctx = context().await;
        let summary = run_batched_pipeline(items(&[1, 2, 3, -4, 5]), &CountingBatches, 2, &ctx)
            .await
            .unwrap();

        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 2);
    }
}

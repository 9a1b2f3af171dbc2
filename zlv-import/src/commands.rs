//! Import commands
//!
//! Wire a source file (or the housing table) through validation, a processor
//! and the pipeline driver. The binary maps each subcommand onto one of these.

use crate::db::housings::{stream_housings_missing_year, OnConflict};
use crate::error::{ImportError, ImportResult};
use crate::processors::{
    normalize_file_year, BuildingProcessor, HistoryProcessor, HousingOwnerProcessor, HousingProcessor,
    HousingStatusProcessor, OwnerProcessor,
};
use crate::reconciliation::ReconciliationEngine;
use crate::reporter::{ProgressReporter, ReportSummary};
use crate::source::{read_records, Departments, SourceOptions};
use crate::validation::{validate_stream, SourceRecord};
use crate::workflow::{run_batched_pipeline, run_pipeline, PipelineContext, Processor};
use futures::TryStreamExt;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zlv_common::config::ImportSettings;

/// Options shared by every import command
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub departments: Departments,
    pub dry_run: bool,
    pub abort_early: bool,
    /// Overrides `settings.chunk_size`
    pub chunk_size: Option<usize>,
    pub settings: ImportSettings,
    pub cancel: CancellationToken,
}

impl ImportOptions {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(self.settings.chunk_size).max(1)
    }

    fn context(&self, pool: &SqlitePool, name: &str) -> PipelineContext {
        let reporter = ProgressReporter::new(name)
            .with_progress_interval(self.settings.progress_interval)
            .with_max_captured_failures(self.settings.max_captured_failures);

        PipelineContext::new(pool.clone(), Arc::new(reporter))
            .with_dry_run(self.dry_run)
            .with_abort_early(self.abort_early)
            .with_max_lock_wait_ms(self.settings.max_lock_wait_ms)
            .with_cancel_token(self.cancel.clone())
    }

    fn source_options<T: SourceRecord>(&self) -> SourceOptions {
        SourceOptions {
            departments: self.departments.clone(),
            department_field: T::department_field(),
            ..Default::default()
        }
    }
}

async fn import_records<P>(pool: &SqlitePool, path: &Path, processor: &P, options: &ImportOptions) -> ImportResult<ReportSummary>
where
    P: Processor,
    P::Record: SourceRecord,
{
    info!(file = %path.display(), pipeline = processor.name(), "Importing");
    let ctx = options.context(pool, processor.name());
    let raw = read_records(path, &options.source_options::<P::Record>()).await?;
    let records = validate_stream::<P::Record>(raw, Arc::clone(&ctx.reporter), ctx.abort_early);
    run_pipeline(records, processor, &ctx).await
}

pub async fn import_owners(pool: &SqlitePool, path: &Path, options: &ImportOptions) -> ImportResult<ReportSummary> {
    import_records(pool, path, &OwnerProcessor::new(pool.clone()), options).await
}

pub async fn import_housings(
    pool: &SqlitePool,
    path: &Path,
    on_conflict: OnConflict,
    options: &ImportOptions,
) -> ImportResult<ReportSummary> {
    import_records(pool, path, &HousingProcessor::new(pool.clone(), on_conflict), options).await
}

pub async fn import_housing_owners(pool: &SqlitePool, path: &Path, options: &ImportOptions) -> ImportResult<ReportSummary> {
    import_records(pool, path, &HousingOwnerProcessor::new(pool.clone()), options).await
}

pub async fn import_history(pool: &SqlitePool, path: &Path, options: &ImportOptions) -> ImportResult<ReportSummary> {
    import_records(pool, path, &HistoryProcessor::new(pool.clone()), options).await
}

pub async fn import_buildings(pool: &SqlitePool, path: &Path, options: &ImportOptions) -> ImportResult<ReportSummary> {
    info!(file = %path.display(), chunk_size = options.chunk_size(), "Importing buildings");
    let processor = BuildingProcessor::new();
    let ctx = options.context(pool, "buildings");
    let raw = read_records(path, &options.source_options::<crate::models::SourceBuilding>()).await?;
    let records = validate_stream(raw, Arc::clone(&ctx.reporter), ctx.abort_early);
    run_batched_pipeline(records, &processor, options.chunk_size(), &ctx).await
}

/// Move vacant housing missing from `year` out of the vacancy pool
pub async fn transition_housing_status(pool: &SqlitePool, year: &str, options: &ImportOptions) -> ImportResult<ReportSummary> {
    let year = normalize_file_year(year)
        .ok_or_else(|| ImportError::InvalidInput(format!("invalid file year '{}'", year)))?;
    info!(%year, "Transitioning housing missing from extract");

    let processor = HousingStatusProcessor::new(options.settings.admin_actor_id);
    let ctx = options.context(pool, processor.name());
    let departments = options.departments.clone();
    let housings = stream_housings_missing_year(pool.clone(), year, options.chunk_size())
        .map_err(ImportError::from)
        .try_filter(move |housing| {
            futures::future::ready(departments.is_empty() || departments.matches(&housing.geo_code))
        });

    run_pipeline(housings, &processor, &ctx).await
}

/// Apply owner pairings from `path`
pub async fn reconcile_owners(pool: &SqlitePool, path: &Path, options: &ImportOptions) -> ImportResult<ReportSummary> {
    let engine = ReconciliationEngine::new(pool.clone(), &options.settings);
    let result = import_records(pool, path, &engine, options).await;

    let stats = engine.stats();
    info!(
        housings_reconciled = stats.housings_reconciled(),
        groups_needing_review = stats.groups_needing_review(),
        "Reconciliation finished"
    );
    result
}

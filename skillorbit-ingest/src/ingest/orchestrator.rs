//! Catalog refresh orchestration
//!
//! One refresh is: parse both sheets into memory, then replace the catalog
//! tables inside a single transaction. Parsing happens before the
//! transaction opens, so a bad workbook never touches the store. The
//! replace runs under the `Ingestor`'s single-flight guard. The deletes and
//! inserts race a time bound and an optional cancellation token, and every
//! early exit there drops the transaction, which rolls it back. COMMIT
//! itself runs to completion.

use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use skillorbit_common::config::{IngestSection, UnparsableDatePolicy};
use skillorbit_common::db::{TrainerRecord, TrainingRecord};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::mapper::{RowMapper, SheetBatch};
use super::replacer::{replace_catalog, ReplaceSummary};
use super::workbook::{read_sheet, TRAINERS_SHEET, TRAININGS_SHEET};
use crate::error::IngestionError;
use crate::utils::{begin_scoped, ScopedTransaction};

/// Per-run knobs, resolved by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub on_unparsable_date: UnparsableDatePolicy,
    /// Upper bound on the deletes and inserts; COMMIT is never cut short
    pub store_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from(&IngestSection::default())
    }
}

impl From<&IngestSection> for IngestOptions {
    fn from(section: &IngestSection) -> Self {
        Self {
            on_unparsable_date: section.on_unparsable_date,
            store_timeout: section.store_timeout(),
        }
    }
}

/// Outcome of a committed refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub trainers_loaded: usize,
    pub trainings_loaded: usize,
    /// Trainer sheet warnings first, then training sheet warnings
    pub warnings: Vec<String>,
}

/// Both sheets, validated and mapped, ready for the replace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogBatch {
    pub trainers: SheetBatch<TrainerRecord>,
    pub trainings: SheetBatch<TrainingRecord>,
}

impl CatalogBatch {
    fn into_result(self) -> IngestResult {
        let mut warnings = self.trainers.warnings;
        warnings.extend(self.trainings.warnings);
        IngestResult {
            trainers_loaded: self.trainers.records.len(),
            trainings_loaded: self.trainings.records.len(),
            warnings,
        }
    }
}

/// Read the trainer sheet, then rewind and read the training sheet
pub fn build_batch<RS: Read + Seek>(
    source: &mut RS,
    mapper: RowMapper,
) -> Result<CatalogBatch, IngestionError> {
    let trainer_sheet = read_sheet(source, TRAINERS_SHEET)?;
    let trainers = mapper.map_trainers(&trainer_sheet.rows);

    let training_sheet = read_sheet(source, TRAININGS_SHEET)?;
    let trainings = mapper.map_trainings(&training_sheet.rows);

    Ok(CatalogBatch { trainers, trainings })
}

/// Entry point for catalog refreshes against one store
///
/// Clones share the single-flight guard, so hand clones to every caller
/// that may refresh the same database.
#[derive(Debug, Clone)]
pub struct Ingestor {
    options: IngestOptions,
    guard: Arc<Mutex<()>>,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(IngestOptions::default())
    }
}

impl Ingestor {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Replace the trainer and training catalogs with the workbook's rows
    pub async fn ingest<R>(
        &self,
        source: R,
        pool: &SqlitePool,
    ) -> Result<IngestResult, IngestionError>
    where
        R: Read + Seek + Send + 'static,
    {
        self.ingest_with_cancel(source, pool, CancellationToken::new()).await
    }

    /// Like [`ingest`](Self::ingest), but gives up once `cancel` fires
    ///
    /// Cancellation is honored up to the moment COMMIT is issued. A cancel
    /// that lands while COMMIT is running is ignored, and the result reports
    /// what the store actually did.
    pub async fn ingest_with_cancel<R>(
        &self,
        source: R,
        pool: &SqlitePool,
        cancel: CancellationToken,
    ) -> Result<IngestResult, IngestionError>
    where
        R: Read + Seek + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("catalog_refresh", run_id = %run_id);
        self.run(source, pool, cancel, run_id).instrument(span).await
    }

    async fn run<R>(
        &self,
        mut source: R,
        pool: &SqlitePool,
        cancel: CancellationToken,
        run_id: Uuid,
    ) -> Result<IngestResult, IngestionError>
    where
        R: Read + Seek + Send + 'static,
    {
        let started = Instant::now();
        info!("Catalog refresh started");

        let mapper = RowMapper::new(self.options.on_unparsable_date);
        let span = Span::current();
        let batch = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            build_batch(&mut source, mapper)
        })
        .await
        .map_err(|e| IngestionError::Internal(format!("workbook parse task failed: {}", e)))?
        .map_err(|e| {
            error!(error = %e, "Workbook rejected, store untouched");
            e
        })?;

        info!(
            trainers = batch.trainers.records.len(),
            trainings = batch.trainings.records.len(),
            warnings = batch.trainers.warnings.len() + batch.trainings.warnings.len(),
            "Workbook parsed"
        );

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Catalog refresh cancelled while waiting for a running refresh");
                return Err(IngestionError::Cancelled);
            }
            permit = self.guard.lock() => permit,
        };

        let timeout = self.options.store_timeout;
        let staged = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Catalog refresh cancelled before commit, transaction rolled back");
                return Err(IngestionError::Cancelled);
            }
            outcome = tokio::time::timeout(timeout, stage_replace(pool, &batch, run_id)) => {
                match outcome {
                    Ok(staged) => staged?,
                    Err(_) => {
                        error!(
                            timeout_ms = timeout.as_millis() as u64,
                            "Catalog replace timed out, transaction rolled back"
                        );
                        return Err(IngestionError::StoreTimeout(timeout));
                    }
                }
            }
        };
        let (tx, summary) = staged;

        if cancel.is_cancelled() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Explicit rollback failed; connection will roll back");
            }
            warn!("Catalog refresh cancelled before commit, transaction rolled back");
            return Err(IngestionError::Cancelled);
        }

        // Not raced: whatever COMMIT reports is what the store did
        tx.commit().await?;

        info!(
            trainers_loaded = summary.trainers_inserted,
            trainings_loaded = summary.trainings_inserted,
            assignments_removed = summary.assignments_removed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Catalog refresh committed"
        );

        Ok(batch.into_result())
    }
}

/// Open the transaction and run the deletes and inserts, leaving the commit
/// to the caller
async fn stage_replace(
    pool: &SqlitePool,
    batch: &CatalogBatch,
    run_id: Uuid,
) -> Result<(ScopedTransaction, ReplaceSummary), IngestionError> {
    let mut tx = begin_scoped(pool, "ingest::replace_catalog", run_id).await?;

    match replace_catalog(tx.conn(), &batch.trainers.records, &batch.trainings.records).await {
        Ok(summary) => Ok((tx, summary)),
        Err(e) => {
            error!(error = %e, "Catalog replace failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    error = %rollback_err,
                    "Explicit rollback failed; connection will roll back on release"
                );
            }
            Err(IngestionError::StoreTransaction(e))
        }
    }
}

//! Pipeline orchestrator: ties source → validator → storage together.
//!
//! One call to `run()` processes one batch to completion: fetch, validate,
//! store. Per-record validation failures are collected and reported, never
//! fatal; source and storage failures abort the run and propagate. A batch
//! with zero valid records still completes successfully — it just skips the
//! storage write.

use crate::config::{AppConfig, ConfigError};
use crate::source::{MarketDataSource, SourceError};
use crate::storage::{Repository, StorageError};
use crate::validator;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PipelineReport {
    pub source: &'static str,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub success_rate: f64,
    pub rows_appended: usize,
    /// Total rows in the table after this run.
    pub table_rows: i64,
    /// Where the data landed; `None` when no write occurred.
    pub db_path: Option<PathBuf>,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        source: &dyn MarketDataSource,
    ) -> Result<PipelineReport, PipelineError> {
        // Invalid invocation surfaces before any side effect.
        self.config.validate()?;

        let repo = Repository::open(&self.config.storage.db_path)?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }

        let run_id = repo.begin_ingest_run(source.name()).unwrap_or(0);

        match self.execute(&repo, source).await {
            Ok(report) => {
                repo.finish_ingest_run(
                    run_id,
                    report.total,
                    report.valid,
                    report.invalid,
                    report.rows_appended,
                    None,
                )
                .ok();
                Ok(report)
            }
            Err(e) => {
                let msg = e.to_string();
                repo.finish_ingest_run(run_id, 0, 0, 0, 0, Some(msg.as_str()))
                    .ok();
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        repo: &Repository,
        source: &dyn MarketDataSource,
    ) -> Result<PipelineReport, PipelineError> {
        info!("=== Step 1: Fetching batch ({} source) ===", source.name());
        let batch = source.fetch_batch().await?;

        info!("=== Step 2: Validating {} records ===", batch.len());
        let outcome = validator::validate(&batch);
        let summary = outcome.summary();
        info!(
            "Validation: {} total | {} valid | {} invalid | {:.1}% success",
            summary.total,
            summary.valid,
            summary.invalid,
            summary.success_rate() * 100.0
        );

        info!("=== Step 3: Storing valid records ===");
        let rows_appended = if outcome.valid.is_empty() {
            info!("No valid records — skipping storage write");
            0
        } else {
            repo.append_records(&outcome.valid)?
        };

        let table_rows = repo.row_count().unwrap_or(0);
        info!(
            "=== Done: {} rows appended | {} rows in table ===",
            rows_appended, table_rows
        );

        Ok(PipelineReport {
            source: source.name(),
            total: summary.total,
            valid: summary.valid,
            invalid: summary.invalid,
            success_rate: summary.success_rate(),
            rows_appended,
            table_rows,
            db_path: (rows_appended > 0).then(|| self.config.storage.db_path.clone()),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

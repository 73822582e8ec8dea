//! Batch runner over a window of working-table rows.
//!
//! Rows are processed one at a time with a fixed pause between them. All
//! updates stay in memory until the single save at the end; an aborted run
//! leaves the working table as it was.

use crate::config::Config;
use crate::enrichment::{apply_update, build_search_query, reconcile, ContactSnapshot};
use crate::errors::AppError;
use crate::models::{
    BatchRequest, BatchResult, Decision, ExtractionResult, RowOutcome, RowReport, SearchResult,
};
use crate::services::{ExtractionProvider, SearchProvider};
use crate::table::{row_index, row_number, WorkingTable};
use crate::table_storage::TableStorage;
use chrono::Local;
use serde::Serialize;
use std::ops::Range;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a batch: `Idle -> Running -> Saved -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Saved,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Pause between consecutive rows. Not applied after the last row.
    pub row_delay: Duration,
    pub num_results: usize,
    pub search_context: String,
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            row_delay: Duration::from_millis(config.row_delay_ms),
            num_results: config.search_results,
            search_context: config.search_context.clone(),
        }
    }
}

/// Maps a request in sheet numbering onto data indexes, clipped to the table.
pub fn resolve_window(request: &BatchRequest, total_rows: usize) -> Result<Range<usize>, AppError> {
    if request.threshold > 100 {
        return Err(AppError::BadRequest(format!(
            "Confidence threshold must be between 0 and 100, got {}",
            request.threshold
        )));
    }
    if request.count == 0 {
        return Err(AppError::BadRequest(
            "Batch size must be at least 1".to_string(),
        ));
    }

    let start = row_index(request.start_row).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Start row must be 2 or greater (row 1 is the header), got {}",
            request.start_row
        ))
    })?;

    if start >= total_rows {
        return Err(AppError::BadRequest(format!(
            "Start row {} is past the last row ({})",
            request.start_row,
            row_number(total_rows.saturating_sub(1))
        )));
    }

    let end = start.saturating_add(request.count).min(total_rows);
    Ok(start..end)
}

pub struct BatchRunner<'a> {
    search: &'a dyn SearchProvider,
    extractor: &'a dyn ExtractionProvider,
    storage: &'a TableStorage,
    settings: BatchSettings,
    state: BatchState,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        search: &'a dyn SearchProvider,
        extractor: &'a dyn ExtractionProvider,
        storage: &'a TableStorage,
        settings: BatchSettings,
    ) -> Self {
        Self {
            search,
            extractor,
            storage,
            settings,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn transition(&mut self, batch_id: Uuid, next: BatchState) {
        tracing::debug!("Batch {}: {:?} -> {:?}", batch_id, self.state, next);
        self.state = next;
    }

    /// Runs one batch and saves the table plus one backup.
    ///
    /// Nothing is written when loading fails or the request does not select
    /// any row.
    pub async fn run(&mut self, request: BatchRequest) -> Result<BatchResult, AppError> {
        let batch_id = Uuid::new_v4();
        tracing::info!(
            "Batch {} requested: start row {}, count {}, threshold {}%",
            batch_id,
            request.start_row,
            request.count,
            request.threshold
        );

        let loaded = self.storage.load_async().await?;
        let mut table = loaded.table;
        let window = resolve_window(&request, table.len())?;

        let added = table.ensure_metadata_columns();
        if added > 0 {
            tracing::info!("Added {} processing metadata column(s)", added);
        }

        self.transition(batch_id, BatchState::Running);
        let total = window.len();
        let mut reports = Vec::with_capacity(total);

        for (position, row) in window.enumerate() {
            tracing::info!(
                "[{}/{}] Processing row {}",
                position + 1,
                total,
                row_number(row)
            );

            let report = self.process_row(&mut table, row, request.threshold).await;
            log_report(&report);
            reports.push(report);

            if position + 1 < total && !self.settings.row_delay.is_zero() {
                tokio::time::sleep(self.settings.row_delay).await;
            }
        }

        let backup = self
            .storage
            .save_with_backup_async(table, loaded.fingerprint, Local::now())
            .await;
        self.transition(batch_id, BatchState::Saved);
        let backup = backup?;

        let result = BatchResult::from_reports(
            batch_id,
            reports,
            self.storage.path().to_path_buf(),
            backup,
        );

        tracing::info!(
            "Batch {} complete: {} processed ({} auto-update, {} manual review), {} skipped",
            batch_id,
            result.rows_processed,
            result.auto_updates,
            result.manual_reviews,
            result.skipped
        );
        self.transition(batch_id, BatchState::Idle);

        Ok(result)
    }

    async fn process_row(&self, table: &mut WorkingTable, row: usize, threshold: u8) -> RowReport {
        let number = row_number(row);

        let Some(name) = table.full_name(row) else {
            return RowReport {
                row_number: number,
                name: String::new(),
                outcome: RowOutcome::MissingName,
            };
        };

        let query = build_search_query(&name, &self.settings.search_context);
        tracing::debug!("Search query: {}", query);

        let results = self.search.search(&query, self.settings.num_results).await;
        if results.is_empty() {
            return RowReport {
                row_number: number,
                name,
                outcome: RowOutcome::NoSearchResults,
            };
        }
        tracing::debug!("Found {} search results for {}", results.len(), name);

        let extracted = match self.extractor.extract_contact(&name, &results).await {
            Ok(extracted) => extracted,
            Err(e) => {
                return RowReport {
                    row_number: number,
                    name,
                    outcome: RowOutcome::ExtractionFailed {
                        reason: e.to_string(),
                    },
                }
            }
        };

        let current = ContactSnapshot::from_table(table, row);
        let update = reconcile(&extracted, &current, threshold, Local::now());
        apply_update(table, row, &update);

        RowReport {
            row_number: number,
            name,
            outcome: RowOutcome::Updated {
                decision: update.decision,
                confidence: update.confidence,
                changes: update.changes.len(),
                notes: update.update_notes,
            },
        }
    }
}

fn log_report(report: &RowReport) {
    match &report.outcome {
        RowOutcome::Updated {
            decision,
            confidence,
            changes,
            ..
        } => tracing::info!(
            "Row {} ({}): {} at {}% confidence, {} change(s)",
            report.row_number,
            report.name,
            decision,
            confidence,
            changes
        ),
        RowOutcome::NoSearchResults => tracing::warn!(
            "Row {} ({}): no search results, skipped",
            report.row_number,
            report.name
        ),
        RowOutcome::ExtractionFailed { reason } => tracing::warn!(
            "Row {} ({}): extraction failed, skipped: {}",
            report.row_number,
            report.name,
            reason
        ),
        RowOutcome::MissingName => {
            tracing::warn!("Row {}: no name, skipped", report.row_number)
        }
    }
}

/// Search plus extraction for one name, without touching the table.
#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    pub name: String,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub extraction: Option<ExtractionResult>,
    pub decision: Option<Decision>,
    pub error: Option<String>,
}

pub async fn lookup(
    search: &dyn SearchProvider,
    extractor: &dyn ExtractionProvider,
    settings: &BatchSettings,
    name: &str,
    threshold: u8,
) -> Result<LookupReport, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }

    let query = build_search_query(name, &settings.search_context);
    let results = search.search(&query, settings.num_results).await;
    tracing::info!("Lookup '{}': {} search results", name, results.len());

    let (extraction, error) = if results.is_empty() {
        (None, Some("No search results".to_string()))
    } else {
        match extractor.extract_contact(name, &results).await {
            Ok(extracted) => (Some(extracted), None),
            Err(e) => (None, Some(e.to_string())),
        }
    };

    let decision = extraction
        .as_ref()
        .map(|e| Decision::for_confidence(e.confidence_score, threshold));

    Ok(LookupReport {
        name: name.to_string(),
        query,
        results,
        extraction,
        decision,
        error,
    })
}

use crate::analytics::{self, ContactFilter};
use crate::batch::{BatchRunner, BatchSettings};
use crate::config::Config;
use crate::directory::{self, DirectoryFilter, DirectoryStore};
use crate::errors::AppError;
use crate::models::{BatchRequest, BatchResult};
use crate::services::{ExtractionProvider, GoogleSearchService, GrokService, SearchProvider};
use crate::table_storage::TableStorage;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, map_response_body::MapResponseBodyLayer,
    trace::TraceLayer,
};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Working table and its backups.
    pub storage: TableStorage,
    /// Journalist directory dataset.
    pub directory: DirectoryStore,
    /// Search collaborator, absent when credentials are missing.
    pub search: Option<Arc<dyn SearchProvider>>,
    /// Extraction collaborator, absent when credentials are missing.
    pub extractor: Option<Arc<dyn ExtractionProvider>>,
    /// Held for the duration of a batch; only one runs at a time.
    pub batch_lock: Arc<Mutex<()>>,
    /// Set while a batch holds `batch_lock`. Read by `status` so it never
    /// contends for the lock.
    pub batch_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        config: Config,
        search: Option<Arc<dyn SearchProvider>>,
        extractor: Option<Arc<dyn ExtractionProvider>>,
    ) -> Self {
        Self {
            storage: TableStorage::new(
                config.working_table.clone(),
                config.output_dir.clone(),
                &config.backup_entity,
            ),
            directory: DirectoryStore::new(config.data_dir.clone()),
            search,
            extractor,
            batch_lock: Arc::new(Mutex::new(())),
            batch_running: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Builds the HTTP collaborators from configuration. A collaborator that
    /// cannot be built is reported and left disabled.
    pub fn from_config(config: Config) -> Self {
        let search: Option<Arc<dyn SearchProvider>> = match GoogleSearchService::from_config(&config) {
            Ok(service) => {
                tracing::info!("✓ Google Custom Search client initialized");
                Some(Arc::new(service))
            }
            Err(e) => {
                tracing::warn!("Search disabled: {}", e);
                None
            }
        };

        let extractor: Option<Arc<dyn ExtractionProvider>> = match GrokService::from_config(&config) {
            Ok(service) => {
                tracing::info!("✓ Grok client initialized (model {})", config.grok_model);
                Some(Arc::new(service))
            }
            Err(e) => {
                tracing::warn!("Extraction disabled: {}", e);
                None
            }
        };

        Self::new(config, search, extractor)
    }

    fn collaborators(
        &self,
    ) -> Result<(Arc<dyn SearchProvider>, Arc<dyn ExtractionProvider>), AppError> {
        let search = self.search.clone().ok_or_else(|| {
            AppError::ServiceUnavailable(
                "Search is disabled: GOOGLE_API_KEY or GOOGLE_SEARCH_ENGINE_ID is not set".to_string(),
            )
        })?;
        let extractor = self.extractor.clone().ok_or_else(|| {
            AppError::ServiceUnavailable("Extraction is disabled: GROK_API_KEY is not set".to_string())
        })?;
        Ok((search, extractor))
    }
}

/// Raises `batch_running` and lowers it on drop, including when the request
/// is abandoned mid-batch.
struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    fn raise(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag.clone())
    }
}

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// JSON API router with tracing, CORS and body-size layers.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/batches", post(start_batch))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/review-queue", get(review_queue))
        .route("/api/v1/contacts", get(contacts))
        .route("/api/v1/contacts/export", get(export_contacts))
        .route("/api/v1/contacts/:row/history", get(row_history))
        .route("/api/v1/history", get(history))
        .route("/api/v1/journalists", get(journalists))
        .route("/api/v1/journalists/stats", get(journalist_stats))
        .route("/api/v1/organizations", get(organizations))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                // Batch requests are tiny
                .layer(RequestBodyLimitLayer::new(64 * 1024)),
        )
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "reporter-updater",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/status
///
/// Collaborator availability, effective settings and whether a batch is running.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(json!({
        "search_enabled": state.search.is_some(),
        "extraction_enabled": state.extractor.is_some(),
        "model": state.extractor.as_ref().map(|e| e.model_name().to_string()),
        "working_table": config.working_table,
        "working_table_exists": config.working_table.exists(),
        "batch_size": config.batch_size,
        "confidence_threshold": config.confidence_threshold,
        "search_results": config.search_results,
        "row_delay_ms": config.row_delay_ms,
        "batch_running": state.batch_running.load(Ordering::SeqCst),
        "problems": config.validate(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchParams {
    pub start_row: Option<usize>,
    pub count: Option<usize>,
    pub threshold: Option<u8>,
}

/// POST /api/v1/batches
///
/// Runs one batch to completion and returns its result. Missing parameters
/// fall back to row 2, the configured batch size and threshold.
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(params): Json<BatchParams>,
) -> Result<Json<BatchResult>, AppError> {
    let request = BatchRequest {
        start_row: params.start_row.unwrap_or(crate::table::FIRST_DATA_ROW),
        count: params.count.unwrap_or(state.config.batch_size),
        threshold: params
            .threshold
            .unwrap_or(state.config.confidence_threshold),
    };
    tracing::info!("POST /batches - {:?}", request);

    let (search, extractor) = state.collaborators()?;

    let _guard = state.batch_lock.try_lock().map_err(|_| {
        AppError::Conflict("A batch is already running; wait for it to finish".to_string())
    })?;
    let _running = RunningFlag::raise(&state.batch_running);

    let mut runner = BatchRunner::new(
        &*search,
        &*extractor,
        &state.storage,
        BatchSettings::from_config(&state.config),
    );
    let result = runner.run(request).await?;

    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub threshold: Option<u8>,
}

/// GET /api/v1/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<analytics::TableStats>, AppError> {
    let table = state.storage.load_async().await?.table;
    let threshold = params
        .threshold
        .unwrap_or(state.config.confidence_threshold);
    Ok(Json(analytics::table_stats(&table, threshold)))
}

/// GET /api/v1/review-queue
pub async fn review_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let table = state.storage.load_async().await?.table;
    let queue = analytics::review_queue(&table);
    Ok(Json(json!({
        "count": queue.len(),
        "rows": queue,
    })))
}

/// GET /api/v1/contacts
pub async fn contacts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ContactFilter>,
) -> Result<Json<serde_json::Value>, AppError> {
    let table = state.storage.load_async().await?.table;
    let rows = analytics::filter_rows(&table, &filter);
    Ok(Json(json!({
        "total": table.len(),
        "count": rows.len(),
        "contacts": analytics::contact_views(&table, &rows),
    })))
}

/// GET /api/v1/contacts/export
///
/// Filtered view as a CSV download.
pub async fn export_contacts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ContactFilter>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.storage.load_async().await?.table;
    let rows = analytics::filter_rows(&table, &filter);
    let bytes = analytics::export_csv(&table, &rows)?;

    let filename = format!(
        "{}_export_{}.csv",
        state.config.backup_entity,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub search: Option<String>,
}

/// GET /api/v1/history
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let table = state.storage.load_async().await?.table;
    let rows = analytics::rows_with_history(&table, params.search.as_deref());
    Ok(Json(json!({
        "count": rows.len(),
        "rows": rows,
    })))
}

/// GET /api/v1/contacts/:row/history
pub async fn row_history(
    State(state): State<Arc<AppState>>,
    Path(row): Path<usize>,
) -> Result<Json<analytics::RowHistory>, AppError> {
    let table = state.storage.load_async().await?.table;
    Ok(Json(analytics::row_history(&table, row)?))
}

/// GET /api/v1/journalists
pub async fn journalists(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DirectoryFilter>,
) -> Result<Json<serde_json::Value>, AppError> {
    let data = state.directory.load_journalists_async().await?;
    let found = filter.apply(&data.journalists);
    Ok(Json(json!({
        "total": data.journalists.len(),
        "count": found.len(),
        "last_updated": data.metadata.last_updated,
        "journalists": found,
    })))
}

/// GET /api/v1/journalists/stats
pub async fn journalist_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<directory::DirectoryStats>, AppError> {
    let data = state.directory.load_journalists_async().await?;
    Ok(Json(directory::directory_stats(&data)))
}

/// GET /api/v1/organizations
pub async fn organizations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let orgs = state.directory.load_organizations_async().await?.organizations;
    let by_priority = directory::organizations_by_priority(&orgs);
    Ok(Json(json!({
        "total": orgs.len(),
        "by_priority": by_priority,
    })))
}

/// HTTP API tests: the router is driven in-process with `oneshot`
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use reporter_updater::config::Config;
use reporter_updater::directory::ScrapedJournalist;
use reporter_updater::errors::AppError;
use reporter_updater::handlers::{router, AppState};
use reporter_updater::models::{ExtractionResult, SearchResult};
use reporter_updater::services::{ExtractionProvider, SearchProvider};
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

struct OneResultSearch;

#[async_trait]
impl SearchProvider for OneResultSearch {
    async fn search(&self, _query: &str, _num_results: usize) -> Vec<SearchResult> {
        vec![SearchResult {
            title: "Profile".to_string(),
            link: "https://outlet.example/p".to_string(),
            snippet: "Editor at OutletB".to_string(),
        }]
    }
}

/// Blocks inside the search call until released, so a batch can be observed
/// while it runs.
struct GatedSearch {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl SearchProvider for GatedSearch {
    async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult> {
        self.entered.notify_one();
        self.release.notified().await;
        OneResultSearch.search(query, num_results).await
    }
}

/// Names starting with "Low" come back at 40%, everyone else at 90%.
struct ScoreByName;

#[async_trait]
impl ExtractionProvider for ScoreByName {
    async fn extract_contact(
        &self,
        name: &str,
        _results: &[SearchResult],
    ) -> Result<ExtractionResult, AppError> {
        Ok(ExtractionResult {
            job_title: Some("Editor".to_string()),
            employer: Some("OutletB".to_string()),
            confidence_score: if name.starts_with("Low") { 40 } else { 90 },
            source_urls: vec!["https://outlet.example/p".to_string()],
            ..Default::default()
        })
    }

    async fn extract_staff(
        &self,
        _organization: &str,
        _chunk: &str,
        _chunk_index: usize,
        _chunk_count: usize,
    ) -> Result<Vec<ScrapedJournalist>, AppError> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

fn test_config(dir: &TempDir) -> Config {
    let working_table = dir.path().join("list.csv");
    fs::write(
        &working_table,
        "שם פרטי,שם משפחה,תפקיד\nHigh,One,Reporter @ OutletA\nLow,Two,Reporter @ OutletA\nHigh,Three,\n",
    )
    .unwrap();

    Config {
        working_table,
        output_dir: dir.path().join("output"),
        logs_dir: dir.path().join("logs"),
        cache_dir: dir.path().join("cache"),
        data_dir: dir.path().join("data"),
        row_delay_ms: 0,
        ..Config::default()
    }
}

fn state_with_collaborators(dir: &TempDir) -> Arc<AppState> {
    Arc::new(AppState::new(
        test_config(dir),
        Some(Arc::new(OneResultSearch)),
        Some(Arc::new(ScoreByName)),
    ))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_batch(app: Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/batches")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get_json(router(state_with_collaborators(&dir)), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_status_reports_collaborators() {
    let dir = TempDir::new().unwrap();
    let (status, body) =
        get_json(router(state_with_collaborators(&dir)), "/api/v1/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_enabled"], true);
    assert_eq!(body["extraction_enabled"], true);
    assert_eq!(body["model"], "fake-model");
    assert_eq!(body["batch_running"], false);
}

#[tokio::test]
async fn test_batch_then_dashboard_views() {
    let dir = TempDir::new().unwrap();
    let state = state_with_collaborators(&dir);

    let (status, result) = post_batch(router(state.clone()), serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["rows_processed"], 3);
    assert_eq!(result["auto_updates"], 2);
    assert_eq!(result["manual_reviews"], 1);
    assert_eq!(result["rows"][1]["status"], "updated");
    assert_eq!(result["rows"][1]["decision"], "MANUAL REVIEW");

    let (_, stats) = get_json(router(state.clone()), "/api/v1/stats?threshold=80").await;
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["processed"], 3);
    assert_eq!(stats["at_or_above_threshold"], 2);

    let (_, queue) = get_json(router(state.clone()), "/api/v1/review-queue").await;
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["rows"][0]["row_number"], 3);

    let (_, contacts) = get_json(
        router(state.clone()),
        "/api/v1/contacts?decision=auto-update&min_confidence=50",
    )
    .await;
    assert_eq!(contacts["count"], 2);
    assert_eq!(contacts["contacts"][0]["fields"]["תפקיד"], "Editor @ OutletB");

    let (_, history) = get_json(router(state.clone()), "/api/v1/history?search=two").await;
    assert_eq!(history["count"], 1);

    let (status, detail) =
        get_json(router(state.clone()), "/api/v1/contacts/3/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["entries"].as_array().unwrap().len(), 1);
    assert_eq!(detail["source_urls"][0], "https://outlet.example/p");
}

#[tokio::test]
async fn test_batch_window_parameters() {
    let dir = TempDir::new().unwrap();
    let state = state_with_collaborators(&dir);

    let (status, result) = post_batch(
        router(state.clone()),
        serde_json::json!({"start_row": 3, "count": 1, "threshold": 30}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["rows"].as_array().unwrap().len(), 1);
    assert_eq!(result["rows"][0]["row_number"], 3);
    assert_eq!(result["auto_updates"], 1);
}

#[tokio::test]
async fn test_batch_rejects_empty_window() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_batch(
        router(state_with_collaborators(&dir)),
        serde_json::json!({"start_row": 50}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("past the last row"));
    assert!(!dir.path().join("output").exists());
}

#[tokio::test]
async fn test_batch_without_collaborators_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let state = Arc::new(AppState::new(test_config(&dir), None, None));

    let (status, _) = post_batch(router(state), serde_json::json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_second_batch_is_rejected_while_one_runs() {
    let dir = TempDir::new().unwrap();
    let state = state_with_collaborators(&dir);

    let _running = state.batch_lock.lock().await;
    let (status, body) = post_batch(router(state.clone()), serde_json::json!({})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));
}

#[tokio::test]
async fn test_status_follows_a_running_batch() {
    let dir = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let state = Arc::new(AppState::new(
        test_config(&dir),
        Some(Arc::new(GatedSearch {
            entered: entered.clone(),
            release: release.clone(),
        })),
        Some(Arc::new(ScoreByName)),
    ));

    let batch = tokio::spawn(post_batch(
        router(state.clone()),
        serde_json::json!({"count": 1}),
    ));
    entered.notified().await;

    let (status, body) = get_json(router(state.clone()), "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["batch_running"], true);

    // status checks leave the lock alone
    for _ in 0..3 {
        get_json(router(state.clone()), "/api/v1/status").await;
    }
    release.notify_one();
    let (status, result) = batch.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["rows_processed"], 1);

    let (_, body) = get_json(router(state.clone()), "/api/v1/status").await;
    assert_eq!(body["batch_running"], false);
    assert!(state.batch_lock.try_lock().is_ok());
}

#[tokio::test]
async fn test_unknown_row_history_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get_json(
        router(state_with_collaborators(&dir)),
        "/api/v1/contacts/40/history",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_is_csv_with_bom() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .uri("/api/v1/contacts/export?name=three")
        .body(Body::empty())
        .unwrap();

    let app = router(state_with_collaborators(&dir));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(body[3..].to_vec()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("High,Three"));
}

#[tokio::test]
async fn test_directory_endpoints_with_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let state = state_with_collaborators(&dir);

    let (status, journalists) = get_json(router(state.clone()), "/api/v1/journalists").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(journalists["total"], 0);

    let (_, stats) = get_json(router(state.clone()), "/api/v1/journalists/stats").await;
    assert_eq!(stats["total"], 0);

    let (_, orgs) = get_json(router(state), "/api/v1/organizations").await;
    assert_eq!(orgs["total"], 0);
}

//! Thin HTTP adapter (§ "Surface vehicle"): exposes the Job/Transfer/Preset
//! APIs as `axum` routes. No pipeline logic lives here — every handler is a
//! short translation from an HTTP request into a call on `QueueOrchestrator`,
//! `TransferFacade`, `PresetStore`, or `ConfigStore`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::cache::{CacheStore, SearchOptions};
use crate::config::ConfigStore;
use crate::domain::{CodecFamily, SourceFacts};
use crate::error::ErrorKind;
use crate::job_store::{JobStore, StatusFilter};
use crate::preset::{Preset, PresetStore};
use crate::queue::QueueOrchestrator;
use crate::transfer::{self, RemoteClient};

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn from_anyhow(e: anyhow::Error) -> Self {
        let status = match crate::error::classify(&e) {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidConfig | ErrorKind::OutputLargerThanInput => StatusCode::BAD_REQUEST,
            ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string() }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub queue: QueueOrchestrator,
    pub job_store: Arc<JobStore>,
    pub transfer: Arc<dyn RemoteClient>,
    pub presets: Arc<PresetStore>,
    pub config: ConfigStore,
    pub cache: Arc<CacheStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/approve", post(approve_job))
        .route("/api/jobs/{id}/reject", post(reject_job))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/jobs/{id}/remove", post(remove_job))
        .route("/api/jobs/{id}/delete", post(delete_job))
        .route("/api/queue/pause", post(pause_queue))
        .route("/api/queue/resume", post(resume_queue))
        .route("/api/queue/pause-after-current", post(pause_after_current))
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/status", get(queue_status))
        .route("/api/queue/clear", post(clear_queue))
        .route("/api/transfer/list", get(list_remote))
        .route("/api/transfer/test-connection", post(transfer_test_connection))
        .route("/api/transfer/scan", get(transfer_scan))
        .route("/api/transfer/folder-stats", get(transfer_folder_stats))
        .route("/api/transfer/download", post(transfer_download))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/index", post(cache_full_index))
        .route("/api/cache/sync", post(cache_sync))
        .route("/api/cache/directory", get(cache_directory))
        .route("/api/cache/folder-stats", get(cache_folder_stats))
        .route("/api/cache/search", get(cache_search))
        .route("/api/cache/invalidate", post(cache_invalidate))
        .route("/api/cache/clear", post(cache_clear))
        .route("/api/presets", get(list_presets).post(save_preset))
        .route("/api/presets/{name}", get(load_preset).delete(delete_preset))
        .route("/api/presets/{name}/push", post(push_preset))
        .route("/api/presets/{name}/pull", post(pull_preset))
        .route("/api/config", get(get_config).post(update_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "timestamp": chrono::Utc::now().to_rfc3339()}))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    remote_path: String,
    source: SourceFacts,
    target_family: CodecFamily,
}

#[derive(Debug, Serialize)]
struct CreateJobResponse {
    id: i64,
}

async fn create_job(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> Response {
    match state.queue.admit_job(req.remote_path, req.source, req.target_family) {
        Ok(id) => Json(CreateJobResponse { id }).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn list_jobs(State(state): State<AppState>) -> Response {
    match state.job_store.list(StatusFilter::default()) {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.job_store.get(id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => AppError { status: StatusCode::NOT_FOUND, message: format!("job {id} not found") }.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn approve_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.queue.approve_job(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct RejectRequest {
    #[serde(default)]
    reason: String,
}

async fn reject_job(State(state): State<AppState>, Path(id): Path<i64>, Json(req): Json<RejectRequest>) -> Response {
    match state.queue.reject_job(id, req.reason).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn retry_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.queue.retry_job(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

/// Removes a job record but leaves any local artifacts it produced on disk.
async fn remove_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.queue.remove_job(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

/// Removes a job record and deletes the local artifacts it produced.
async fn delete_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.queue.delete_job(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn queue_stats(State(state): State<AppState>) -> Response {
    match state.queue.get_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn queue_status(State(state): State<AppState>) -> Json<crate::event_bus::StatusChangeEvent> {
    Json(state.queue.get_status())
}

async fn clear_queue(State(state): State<AppState>) -> Response {
    match state.queue.clear() {
        Ok(count) => Json(serde_json::json!({"cleared": count})).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn pause_queue(State(state): State<AppState>) -> StatusCode {
    state.queue.pause();
    StatusCode::NO_CONTENT
}

async fn resume_queue(State(state): State<AppState>) -> StatusCode {
    state.queue.resume();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct PauseAfterCurrentRequest {
    enabled: bool,
}

async fn pause_after_current(State(state): State<AppState>, Json(req): Json<PauseAfterCurrentRequest>) -> StatusCode {
    state.queue.request_pause_after_current(req.enabled);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct ListRemoteQuery {
    path: Option<String>,
}

async fn list_remote(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.transfer.list(path).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn transfer_test_connection(State(state): State<AppState>) -> Response {
    match transfer::test_connection(state.transfer.as_ref()).await {
        Ok(connected) => Json(serde_json::json!({"connected": connected})).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn transfer_scan(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match transfer::scan_recursive(state.transfer.as_ref(), path).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn transfer_folder_stats(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match transfer::get_folder_stats(state.transfer.as_ref(), path).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    path: String,
    is_dir: bool,
}

async fn transfer_download(State(state): State<AppState>, Json(req): Json<DownloadRequest>) -> Response {
    let snapshot = state.config.snapshot().await;
    match transfer::download_to_default(state.transfer.as_ref(), &req.path, req.is_dir, &snapshot.storage.local_temp).await {
        Ok(paths) => Json(paths).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_stats(State(state): State<AppState>) -> Response {
    match state.cache.get_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_full_index(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.cache.full_index(state.transfer.as_ref(), path).await {
        Ok(indexed) => Json(serde_json::json!({"indexed": indexed})).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_sync(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.cache.sync(state.transfer.as_ref(), path).await {
        Ok(synced) => Json(serde_json::json!({"synced": synced})).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_directory(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.cache.get_directory(path) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_folder_stats(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.cache.get_folder_stats(path) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CacheSearchQuery {
    q: String,
    #[serde(default)]
    video_only: bool,
    limit: Option<usize>,
}

async fn cache_search(State(state): State<AppState>, Query(params): Query<CacheSearchQuery>) -> Response {
    let options = SearchOptions { video_only: params.video_only, limit: params.limit };
    match state.cache.search(&params.q, options) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_invalidate(State(state): State<AppState>, Query(params): Query<ListRemoteQuery>) -> Response {
    let path = params.path.as_deref().unwrap_or("/");
    match state.cache.invalidate(path) {
        Ok(removed) => Json(serde_json::json!({"removed": removed})).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn cache_clear(State(state): State<AppState>) -> Response {
    match state.cache.clear() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn list_presets(State(state): State<AppState>) -> Response {
    match state.presets.list() {
        Ok(names) => Json(names).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn save_preset(State(state): State<AppState>, Json(preset): Json<Preset>) -> Response {
    match state.presets.save(&preset) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn load_preset(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.presets.load(&name) {
        Ok(preset) => Json(preset).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn delete_preset(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.presets.delete(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn push_preset(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.presets.push(state.transfer.as_ref(), &name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn pull_preset(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.presets.pull(state.transfer.as_ref(), &name).await {
        Ok(preset) => Json(preset).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.config.snapshot().await).unwrap_or_default())
}

async fn update_config(State(state): State<AppState>, Json(patch): Json<serde_json::Value>) -> Response {
    match state.config.update(patch).await {
        Ok(config) => Json(config).into_response(),
        Err(e) => AppError::from_anyhow(e).into_response(),
    }
}

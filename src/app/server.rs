//! HTTP boundary: translates requests into worker commands and worker
//! results into JSON.

use super::worker::WorkerHandle;
use super::SessionStatus;
use crate::error::Error;
use crate::model::ExtractedRecord;
use crate::scan::normalize_query;
use crate::shutdown::ShutdownController;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// First path segments owned by a dedicated route.
const RESERVED: &[&str] = &["files", "health", "status", "search", "download"];

#[derive(Clone)]
pub struct ServerState {
    pub worker: WorkerHandle,
    /// Configured channel reference, for `/status`.
    pub channel: String,
}

pub fn router(state: ServerState, download_dir: PathBuf) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/download/{message_id}", get(download))
        .route("/health", get(health))
        .route("/status", get(status))
        .nest_service("/files", ServeDir::new(download_dir))
        .route("/{*term}", get(universal))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is triggered.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: ShutdownController,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Error as sent to HTTP clients.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidQuery => StatusCode::BAD_REQUEST,
            Error::MessageNotFound(_)
            | Error::NoMedia(_)
            | Error::DownloadFailed { .. }
            | Error::Connection(_)
            | Error::EntityResolution { .. } => StatusCode::NOT_FOUND,
            Error::Configuration(_) | Error::WorkerUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({
            "status": "error",
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    query: Option<String>,
    search: Option<String>,
}

impl SearchParams {
    fn first(&self) -> Option<&str> {
        [&self.q, &self.query, &self.search]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    status: &'static str,
    message: String,
    results: Vec<ExtractedRecord>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct DownloadResponse {
    status: &'static str,
    message: &'static str,
    url: String,
    download_url: String,
    file_name: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    channel: String,
    timestamp: String,
    session: SessionStatus,
}

async fn run_search(
    state: &ServerState,
    raw: &str,
) -> Result<(String, Vec<ExtractedRecord>), ApiError> {
    let query = normalize_query(raw)?;
    let results = state.worker.search(query.clone()).await?;
    Ok((query, results))
}

async fn search(
    State(state): State<ServerState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResponse> {
    let (_, results) = run_search(&state, params.first().unwrap_or_default()).await?;
    let message = if results.is_empty() {
        "No se encontraron películas".to_string()
    } else {
        format!("Se encontraron {} resultados", results.len())
    };
    Ok(Json(SearchResponse {
        status: "success",
        message,
        count: results.len(),
        results,
    }))
}

async fn download(
    State(state): State<ServerState>,
    Path(message_id): Path<String>,
) -> Result<Json<DownloadResponse>, Response> {
    let Ok(message_id) = message_id.parse::<i32>() else {
        let body = serde_json::json!({
            "status": "error",
            "message": format!("Invalid message id {message_id:?}"),
        });
        return Err((StatusCode::NOT_FOUND, Json(body)).into_response());
    };

    let result = state
        .worker
        .download(message_id)
        .await
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(DownloadResponse {
        status: "success",
        message: "Contenido disponible para descarga",
        download_url: result.url.clone(),
        url: result.url,
        file_name: result.file_name,
        size: result.size,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn status(State(state): State<ServerState>) -> ApiResult<StatusResponse> {
    let session = state.worker.status().await?;
    Ok(Json(StatusResponse {
        status: "online",
        service: env!("CARGO_PKG_NAME"),
        channel: state.channel.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        session,
    }))
}

/// `/<term>` searches for `term` with `_` read as a space, unless a `q` or
/// `query` parameter is given.
async fn universal(
    State(state): State<ServerState>,
    Path(term): Path<String>,
    Query(params): Query<SearchParams>,
) -> Response {
    let head = term.split('/').next().unwrap_or_default();
    if RESERVED.contains(&head) {
        let body = serde_json::json!({
            "status": "error",
            "message": format!("Use the dedicated /{head} route"),
        });
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }

    let from_path = term.replace('_', " ");
    let raw = params
        .q
        .as_deref()
        .or(params.query.as_deref())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&from_path);

    match run_search(&state, raw).await {
        Ok((query, results)) => Json(SearchResponse {
            status: "success",
            message: format!("Búsqueda para '{query}'"),
            count: results.len(),
            results,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

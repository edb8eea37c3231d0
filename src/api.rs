use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::browser::PageLoader;
use crate::scrape;

/// Shared service state: the rendering capability plus the gate that keeps a
/// single browser pipeline in flight per process.
pub struct AppState {
    pub loader: Arc<dyn PageLoader>,
    pub browser_gate: Mutex<()>,
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub url: String,
}

/// POST /scrape: run the full acquire-and-extract pipeline for one address.
pub async fn scrape_page(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrapeRequest>,
) -> Response {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Missing URL" }))).into_response();
    }

    // A rendering browser is heavy; callers queue here instead of racing
    // multiple Chrome processes on a small host.
    let _guard = state.browser_gate.lock().await;

    match scrape::scrape_site(state.loader.as_ref(), &url).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            eprintln!("❌ Scrape failed for {}: {}", url, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to load site", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /: health probe, no core logic involved.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

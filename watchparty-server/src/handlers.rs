//! HTTP handlers

use std::path::PathBuf;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Json, Response};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use watchparty_core::media::{self, MediaAsset, ServePlan, VideoInfo};

use crate::error::ApiError;
use crate::lan;
use crate::metrics::{LogLevel, StatsSnapshot};
use crate::server::AppState;

pub async fn health() -> Json<Value> {
    debug!("Health check received");
    Json(json!({ "status": "ok" }))
}

async fn current_asset(state: &AppState) -> MediaAsset {
    let path = state.media_path.read().clone();
    MediaAsset::probe(path.as_deref()).await
}

pub async fn video_info(State(state): State<AppState>) -> Json<VideoInfo> {
    Json(current_asset(&state).await.info())
}

/// Serve the current video, honoring a single `Range: bytes=` window
pub async fn stream_video(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let asset = current_asset(&state).await;
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let plan = media::plan(asset, range)?;
    let stream = plan.open().await?.inspect_err(|e| {
        warn!("Video stream aborted: {}", e);
    });
    state.metrics.write().video_request();

    let window = plan.window();
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, plan.asset().mime_type)
        .header(header::CONTENT_LENGTH, window.len())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "public, max-age=3600");

    response = match plan {
        ServePlan::Full { .. } => response.status(StatusCode::OK),
        ServePlan::Partial { .. } => {
            debug!("Serving {}", window.content_range());
            response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, window.content_range())
        }
    };

    response
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn public_url(State(state): State<AppState>) -> Json<Value> {
    let status = state.tunnel.read().clone();
    Json(json!({
        "url": status.url(),
        "status": status.label(),
    }))
}

pub async fn lan_url(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "urls": lan::lan_urls(&state.lan_ips, state.port) }))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.metrics.read().snapshot())
}

#[derive(Deserialize)]
struct VideoPathUpdate {
    path: String,
}

/// Point the server at another file. The body is parsed by hand so every
/// malformed payload maps to the same 400.
pub async fn set_video_path(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let update: VideoPathUpdate = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidInput("Invalid path".to_string()))?;
    if update.path.is_empty() {
        return Err(ApiError::InvalidInput("Invalid path".to_string()));
    }

    info!("Video path updated: {}", update.path);
    state
        .metrics
        .write()
        .log(LogLevel::Info, format!("Video path: {}", update.path));
    *state.media_path.write() = Some(PathBuf::from(update.path));

    Ok(Json(json!({ "success": true })))
}

//! HTTP request handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Extension, MatchedPath, Query, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tile_common::{TileCoord, TileError, TileResult};
use tracing::{error, info, warn};

use crate::state::AppState;

/// Delay between answering `/debug/quit` and stopping the listeners.
pub const QUIT_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// Tile Handler
// ============================================================================

/// Raw `/tile` query. Kept as strings so parse failures can be reported per
/// parameter instead of as a generic query rejection.
#[derive(Debug, Default, Deserialize)]
pub struct TileParams {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    #[serde(rename = "tile-size")]
    pub tile_size: Option<String>,
}

impl TileParams {
    /// Tile coordinate, treating missing values as 0.
    pub fn coord(&self) -> TileResult<TileCoord> {
        Ok(TileCoord::new(
            parse_index("z", self.z.as_deref())?,
            parse_index("x", self.x.as_deref())?,
            parse_index("y", self.y.as_deref())?,
        ))
    }

    /// Requested tile size, or `default` when absent or not a number.
    ///
    /// Range and power-of-two checks happen in the service.
    pub fn tile_size(&self, default: u32) -> i64 {
        self.tile_size
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(default as i64)
    }
}

fn parse_index(name: &str, value: Option<&str>) -> TileResult<u32> {
    match value.map(str::trim) {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<u32>()
            .map_err(|_| TileError::invalid_parameter(name, format!("'{}' is not a non-negative integer", s))),
    }
}

pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TileParams>,
) -> Response {
    let coord = match params.coord() {
        Ok(coord) => coord,
        Err(e) => return error_response(e),
    };
    let tile_size = params.tile_size(state.service.default_tile_size());

    match state.service.serve(coord, tile_size).await {
        Ok(png) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::CONTENT_LENGTH, png.len().to_string()),
            ],
            png,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: TileError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        TileError::InvalidTileSize(size) => {
            warn!(tile_size = size, "Rejected tile size");
            status.into_response()
        }
        e if e.is_client_error() => {
            warn!(error = %e, "Rejected tile request");
            (status, e.to_string()).into_response()
        }
        e => {
            error!(error = %e, "Tile request failed");
            (status, e.to_string()).into_response()
        }
    }
}

// ============================================================================
// Health, Metrics and Debug Handlers
// ============================================================================

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Prometheus text exposition.
pub async fn metrics_handler(prometheus: Option<Extension<PrometheusHandle>>) -> Response {
    match prometheus {
        Some(Extension(handle)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// JSON counters.
pub async fn debug_vars_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let range = state.service.renderer().colorer().value_range().snapshot();
    Json(state.metrics.snapshot(range).await)
}

pub async fn debug_vars_reset_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    state.metrics.reset().await;
    state.service.renderer().colorer().value_range().reset();
    info!("Debug counters reset");
    (StatusCode::OK, "ok")
}

/// Answer, then stop every listener after [`QUIT_DELAY`].
pub async fn quit_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!(delay_ms = QUIT_DELAY.as_millis() as u64, "Quit requested");
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(QUIT_DELAY).await;
        shutdown.send(()).ok();
    });
    (StatusCode::OK, "ok")
}

// ============================================================================
// Middleware
// ============================================================================

/// Label for requests that match no route, so unknown paths share one series.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Count and time every request by its route.
pub async fn track_requests(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());
    let start = Instant::now();
    let response = next.run(request).await;
    state.metrics.record_request(&path, start.elapsed()).await;
    response
}

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use renderer::png::decode_tile;
use renderer::settings::DEFAULT_INTERIOR_COLOR;
use renderer::LeafRenderer;
use tile_server::handlers::UNMATCHED_PATH;
use tile_server::metrics::TileMetrics;
use tile_server::server::build_router;
use tile_server::{AppState, TileServerConfig, TileService};
use tower::ServiceExt;

fn state(max_iterations: u32) -> Arc<AppState> {
    let config = TileServerConfig {
        max_iterations,
        ..TileServerConfig::default()
    };
    let service = TileService::new(
        LeafRenderer::from_settings(&config.render_settings()),
        &config,
        Arc::new(TileMetrics::new()),
    );
    Arc::new(AppState::with_service(service))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

// ============================================================================
// /tile
// ============================================================================

#[tokio::test]
async fn test_tile_end_to_end_zoom_zero() {
    let app = build_router(state(1000), None);
    let (status, content_type, body) = get(app, "/tile?x=0&y=0&z=0&tile-size=256").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    let tile = decode_tile(&body).unwrap();
    assert_eq!(tile.dimensions(), (256, 256));
    // c' = -0.5 sits in the main cardioid
    assert_eq!(tile.get_pixel(228, 200).0, DEFAULT_INTERIOR_COLOR.to_array());
}

#[tokio::test]
async fn test_tile_sets_content_length() {
    let app = build_router(state(100), None);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/tile?x=1&y=1&z=2&tile-size=32")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let length: usize = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(length, body.len());
}

#[tokio::test]
async fn test_missing_params_use_defaults() {
    let app = build_router(state(100), None);
    let (status, _, body) = get(app, "/tile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decode_tile(&body).unwrap().dimensions(), (256, 256));
}

#[tokio::test]
async fn test_unparseable_tile_size_uses_default() {
    let app = build_router(state(100), None);
    let (status, _, body) = get(app, "/tile?tile-size=big").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decode_tile(&body).unwrap().dimensions(), (256, 256));
}

#[tokio::test]
async fn test_invalid_tile_size_is_400_with_empty_body() {
    let app = build_router(state(100), None);
    for size in ["0", "3", "255", "1025", "2048", "-64"] {
        let (status, _, body) = get(app.clone(), &format!("/tile?tile-size={}", size)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "tile-size={}", size);
        assert!(body.is_empty(), "tile-size={}", size);
    }
}

#[tokio::test]
async fn test_invalid_coordinate_is_400() {
    let app = build_router(state(100), None);
    let (status, _, body) = get(app, "/tile?x=-1&tile-size=32").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("'x'"));
}

// ============================================================================
// Health and debug endpoints
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = build_router(state(100), None);
    let (status, _, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let app = build_router(state(100), None);
    let (status, _, _) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_debug_vars_count_requests_and_reset() {
    let state = state(100);
    let app = build_router(state.clone(), None);

    get(app.clone(), "/tile?x=0&y=0&z=1&tile-size=32").await;
    get(app.clone(), "/tile?x=1&y=0&z=1&tile-size=32").await;
    get(app.clone(), "/health").await;

    let (status, content_type, body) = get(app.clone(), "/debug/vars").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let vars: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(vars["request_counts"]["/tile"], 2);
    assert_eq!(vars["request_counts"]["/health"], 1);
    assert_eq!(vars["tile_counts"]["32"], 2);
    assert!(vars["smooth_value_max"].as_f64().is_some());

    let (status, _, _) = get(app.clone(), "/debug/vars/reset").await;
    assert_eq!(status, StatusCode::OK);

    let snap = state.metrics.snapshot(None).await;
    // The reset request itself is recorded after the counters were cleared
    assert_eq!(snap.request_counts.get("/tile"), None);
    assert!(snap.tile_counts.is_empty());
    assert_eq!(
        state.service.renderer().colorer().value_range().snapshot(),
        None
    );
}

#[tokio::test]
async fn test_quit_fires_shutdown() {
    let state = state(100);
    let mut stop = state.shutdown.subscribe();
    let app = build_router(state.clone(), None);

    let (status, _, body) = get(app, "/debug/quit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    tokio::time::timeout(std::time::Duration::from_secs(5), stop.recv())
        .await
        .expect("shutdown not signalled")
        .unwrap();
}

// ============================================================================
// Request tracking
// ============================================================================

#[tokio::test]
async fn test_unknown_paths_share_one_counter() {
    let state = state(100);
    let app = build_router(state.clone(), None);

    for i in 0..50 {
        let (status, _, _) = get(app.clone(), &format!("/nope/{}", i)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, _, _) = get(app.clone(), "/tile?x=0&y=0&z=0&tile-size=16").await;
    assert_eq!(status, StatusCode::OK);

    let snap = state.metrics.snapshot(None).await;
    assert_eq!(snap.request_counts.len(), 2);
    assert_eq!(snap.request_counts[UNMATCHED_PATH], 50);
    assert_eq!(snap.request_counts["/tile"], 1);
}

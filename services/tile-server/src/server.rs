//! Router construction and multi-port listeners.
//!
//! Every port serves the same router and state. Binding several ports works
//! around browsers' per-host connection limits when a map view loads many
//! tiles at once.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::Extension, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::TileServerConfig;
use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>, prometheus: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route("/tile", get(handlers::tile_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/debug/vars", get(handlers::debug_vars_handler))
        .route("/debug/vars/reset", get(handlers::debug_vars_reset_handler))
        .route("/debug/quit", get(handlers::quit_handler))
        .layer(middleware::from_fn(handlers::track_requests))
        .layer(Extension(state));

    if let Some(handle) = prometheus {
        app = app.layer(Extension(handle));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind every configured port. Any bind failure is fatal.
pub async fn bind_all(config: &TileServerConfig) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();
    for port in config.ports() {
        let addr = format!("{}:{}", config.listen_host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!(address = %addr, "Listening");
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Serve `app` on every listener until `shutdown` fires.
pub async fn serve_all(
    listeners: Vec<TcpListener>,
    app: Router,
    shutdown: broadcast::Sender<()>,
) -> Result<()> {
    let tasks: Vec<_> = listeners
        .into_iter()
        .map(|listener| {
            let app = app.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        stop.recv().await.ok();
                    })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.context("Listener task panicked")??;
    }
    info!("All listeners stopped");
    Ok(())
}

/// Fire `shutdown` on Ctrl+C.
pub fn spawn_signal_handler(shutdown: broadcast::Sender<()>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.send(()).ok();
        }
    });
}

//! Shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use crate::config::TileServerConfig;
use crate::metrics::TileMetrics;
use crate::service::TileService;

/// State shared by every listener and handler.
pub struct AppState {
    pub service: TileService,
    pub metrics: Arc<TileMetrics>,
    /// Signals every listener to stop.
    pub shutdown: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(config: &TileServerConfig) -> Result<Self> {
        let metrics = Arc::new(TileMetrics::new());
        let service = TileService::from_config(config, metrics.clone())
            .context("Failed to build tile service")?;
        Ok(Self::with_service(service))
    }

    pub fn with_service(service: TileService) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            metrics: service.metrics().clone(),
            service,
            shutdown,
        }
    }
}

//! Tile service facade: validate, dispatch, encode.

use std::sync::Arc;
use std::time::Instant;

use renderer::png::encode_tile;
use renderer::{LeafRenderer, RenderedTile};
use tile_common::{is_power_of_two, TileCoord, TileError, TileResult};
use tracing::{debug, instrument};

use crate::compositor::TileCompositor;
use crate::config::TileServerConfig;
use crate::fetch::HttpTileFetcher;
use crate::metrics::TileMetrics;
use crate::pool::TileServerPool;

/// How a tile request is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// Rendered here at full size, with oversampling.
    Leaf,
    /// Assembled from leaf sub-tiles fetched concurrently.
    Composite,
}

/// Accept `tile_size` only if it is a power of two in `1..=max_tile_size`.
pub fn validate_tile_size(tile_size: i64, max_tile_size: u32) -> TileResult<u32> {
    if tile_size <= 0 || tile_size > max_tile_size as i64 || !is_power_of_two(tile_size) {
        return Err(TileError::InvalidTileSize(tile_size));
    }
    Ok(tile_size as u32)
}

pub struct TileService {
    renderer: LeafRenderer,
    compositor: Option<TileCompositor>,
    oversample: u32,
    default_tile_size: u32,
    max_tile_size: u32,
    metrics: Arc<TileMetrics>,
}

impl TileService {
    /// A service that always renders directly.
    pub fn new(renderer: LeafRenderer, config: &TileServerConfig, metrics: Arc<TileMetrics>) -> Self {
        Self {
            renderer,
            compositor: None,
            oversample: config.oversample,
            default_tile_size: config.default_tile_size,
            max_tile_size: config.max_tile_size,
            metrics,
        }
    }

    /// Composite tiles larger than the compositor's leaf size.
    pub fn with_compositor(mut self, compositor: TileCompositor) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// Build the renderer, and an HTTP compositor when downstream servers
    /// are configured.
    pub fn from_config(config: &TileServerConfig, metrics: Arc<TileMetrics>) -> TileResult<Self> {
        let renderer = LeafRenderer::from_settings(&config.render_settings());
        let service = Self::new(renderer, config, metrics);

        let pool = TileServerPool::new(config.tile_servers.clone());
        if pool.is_empty() {
            return Ok(service);
        }
        let fetcher = HttpTileFetcher::new(pool, config.fetch_timeout)?;
        Ok(service.with_compositor(TileCompositor::new(
            Arc::new(fetcher),
            config.leaf_tile_size,
            config.fetch_timeout,
            config.max_concurrent_fetches,
        )))
    }

    pub fn renderer(&self) -> &LeafRenderer {
        &self.renderer
    }

    pub fn metrics(&self) -> &Arc<TileMetrics> {
        &self.metrics
    }

    pub fn default_tile_size(&self) -> u32 {
        self.default_tile_size
    }

    pub fn max_tile_size(&self) -> u32 {
        self.max_tile_size
    }

    pub fn dispatch(&self, tile_size: u32) -> RenderPath {
        match &self.compositor {
            Some(compositor) if tile_size > compositor.leaf_tile_size() => RenderPath::Composite,
            _ => RenderPath::Leaf,
        }
    }

    /// Render an already validated tile size.
    pub async fn render(&self, coord: TileCoord, tile_size: u32) -> TileResult<RenderedTile> {
        match (self.dispatch(tile_size), &self.compositor) {
            (RenderPath::Composite, Some(compositor)) => {
                let composite = compositor.render(coord, tile_size).await?;
                self.metrics
                    .record_subtiles(composite.succeeded, composite.failed);
                Ok(composite.image)
            }
            _ => {
                let renderer = self.renderer.clone();
                let oversample = self.oversample;
                tokio::task::spawn_blocking(move || renderer.render(coord, tile_size, oversample))
                    .await
                    .map_err(|e| TileError::InternalError(format!("render task failed: {}", e)))?
            }
        }
    }

    /// Validate, render and PNG-encode one tile.
    #[instrument(skip(self), fields(tile = %coord))]
    pub async fn serve(&self, coord: TileCoord, tile_size: i64) -> TileResult<Vec<u8>> {
        let tile_size = validate_tile_size(tile_size, self.max_tile_size)?;
        if !coord.is_within_matrix() {
            debug!("Tile outside the zoom level's matrix");
        }
        self.metrics.record_tile_started(tile_size).await;
        let start = Instant::now();

        let tile = self.render(coord, tile_size).await?;
        let png = tokio::task::spawn_blocking(move || encode_tile(&tile))
            .await
            .map_err(|e| TileError::InternalError(format!("encode task failed: {}", e)))??;

        let elapsed = start.elapsed();
        self.metrics.record_tile_finished(tile_size, elapsed).await;
        self.metrics
            .record_value_range(self.renderer.colorer().value_range().snapshot());
        debug!(
            tile_size = tile_size,
            bytes = png.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Tile served"
        );
        Ok(png)
    }
}

//! Sub-tile fetchers used by the compositor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use renderer::png::decode_tile;
use renderer::{LeafRenderer, RenderedTile};
use tile_common::{TileCoord, TileError, TileResult};
use tracing::{debug, instrument};

use crate::pool::TileServerPool;

/// Outcome of one sub-tile fetch. `image` is `None` when the fetch failed.
#[derive(Debug, Clone)]
pub struct SubTileResult {
    pub coord: TileCoord,
    pub image: Option<RenderedTile>,
}

impl SubTileResult {
    pub fn is_ok(&self) -> bool {
        self.image.is_some()
    }
}

/// Source of leaf-sized sub-tile images.
#[async_trait]
pub trait SubTileFetcher: Send + Sync {
    /// Fetch `coord` rendered as a `tile_size` square.
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<RenderedTile>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Fetches sub-tiles from a random downstream server over HTTP.
///
/// Downstream servers speak the same `/tile` protocol, so they may in turn
/// composite from their own downstream pool.
pub struct HttpTileFetcher {
    client: Client,
    pool: TileServerPool,
}

impl HttpTileFetcher {
    pub fn new(pool: TileServerPool, timeout: Duration) -> TileResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TileError::InternalError(format!("HTTP client: {}", e)))?;
        Ok(Self { client, pool })
    }

    fn tile_url(host: &str, coord: TileCoord, tile_size: u32) -> String {
        format!(
            "http://{}/tile?x={}&y={}&z={}&tile-size={}",
            host, coord.x, coord.y, coord.z, tile_size
        )
    }
}

#[async_trait]
impl SubTileFetcher for HttpTileFetcher {
    #[instrument(skip(self), fields(tile = %coord))]
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<RenderedTile> {
        let host = self
            .pool
            .pick()
            .ok_or_else(|| TileError::FetchError("no downstream tile servers".to_string()))?;
        let url = Self::tile_url(host, coord, tile_size);
        debug!(url = %url, "Fetching sub-tile");

        let response = self.client.get(&url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TileError::FetchError(format!("{} returned {}", host, status)));
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        decode_tile(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn fetch_error(err: reqwest::Error) -> TileError {
    if err.is_timeout() {
        TileError::Timeout
    } else {
        TileError::FetchError(err.to_string())
    }
}

/// Renders sub-tiles in-process on the blocking thread pool.
#[derive(Clone)]
pub struct LocalTileFetcher {
    renderer: LeafRenderer,
    oversample: u32,
}

impl LocalTileFetcher {
    pub fn new(renderer: LeafRenderer, oversample: u32) -> Self {
        Self {
            renderer,
            oversample,
        }
    }
}

#[async_trait]
impl SubTileFetcher for LocalTileFetcher {
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<RenderedTile> {
        let renderer = self.renderer.clone();
        let oversample = self.oversample;
        tokio::task::spawn_blocking(move || renderer.render(coord, tile_size, oversample))
            .await
            .map_err(|e| TileError::InternalError(format!("render task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

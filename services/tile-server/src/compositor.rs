//! Composite a large tile from leaf-sized sub-tiles.
//!
//! A tile of size `n * leaf` is split into an `n x n` grid. Every sub-tile is
//! fetched concurrently, then blitted at its own offset, so arrival order
//! does not matter. A failed, timed out or wrongly sized sub-tile leaves its
//! region transparent; the composite itself never fails because of one.

use std::sync::Arc;
use std::time::Duration;

use image::imageops;
use renderer::RenderedTile;
use tile_common::{SubTileGrid, TileCoord, TileError, TileResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::fetch::{SubTileFetcher, SubTileResult};

/// A composited tile plus fetch bookkeeping.
#[derive(Debug)]
pub struct Composite {
    pub image: RenderedTile,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct TileCompositor {
    fetcher: Arc<dyn SubTileFetcher>,
    leaf_tile_size: u32,
    fetch_timeout: Duration,
    max_concurrent_fetches: usize,
}

impl TileCompositor {
    pub fn new(
        fetcher: Arc<dyn SubTileFetcher>,
        leaf_tile_size: u32,
        fetch_timeout: Duration,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            fetcher,
            leaf_tile_size,
            fetch_timeout,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    pub fn leaf_tile_size(&self) -> u32 {
        self.leaf_tile_size
    }

    /// Render `coord` at `tile_size` by compositing leaf sub-tiles.
    pub async fn render(&self, coord: TileCoord, tile_size: u32) -> TileResult<Composite> {
        let grid = SubTileGrid::new(coord, tile_size, self.leaf_tile_size)?;
        let results = self.fetch_all(&grid).await?;

        let mut image = RenderedTile::new(tile_size, tile_size);
        let mut succeeded = 0;
        for result in results {
            let Some(sub) = result.image else { continue };
            match grid.pixel_offset(&result.coord) {
                Some((ox, oy)) => {
                    imageops::replace(&mut image, &sub, ox as i64, oy as i64);
                    succeeded += 1;
                }
                None => warn!(sub = %result.coord, parent = %coord, "Sub-tile outside grid"),
            }
        }

        let failed = grid.len() - succeeded;
        debug!(
            tile = %coord,
            tile_size = tile_size,
            succeeded = succeeded,
            failed = failed,
            "Composite done"
        );
        Ok(Composite {
            image,
            succeeded,
            failed,
        })
    }

    /// Fetch every sub-tile of `grid`, waiting for all of them.
    ///
    /// At most `max_concurrent_fetches` are in flight at once. A task that
    /// panics is dropped from the result, which the caller sees as a missing
    /// sub-tile.
    pub async fn fetch_all(&self, grid: &SubTileGrid) -> TileResult<Vec<SubTileResult>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut tasks = JoinSet::new();

        for sub in grid.iter() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TileError::InternalError(format!("fetch semaphore: {}", e)))?;
            let fetcher = self.fetcher.clone();
            let leaf = self.leaf_tile_size;
            let timeout = self.fetch_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let image = match tokio::time::timeout(timeout, fetcher.fetch(sub, leaf)).await {
                    Ok(Ok(img)) if img.dimensions() == (leaf, leaf) => Some(img),
                    Ok(Ok(img)) => {
                        warn!(
                            sub = %sub,
                            fetcher = fetcher.name(),
                            width = img.width(),
                            height = img.height(),
                            "Sub-tile has wrong size"
                        );
                        None
                    }
                    Ok(Err(e)) => {
                        warn!(sub = %sub, fetcher = fetcher.name(), error = %e, "Sub-tile fetch failed");
                        None
                    }
                    Err(_) => {
                        warn!(sub = %sub, fetcher = fetcher.name(), "Sub-tile fetch timed out");
                        None
                    }
                };
                SubTileResult { coord: sub, image }
            });
        }

        let mut results = Vec::with_capacity(grid.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "Sub-tile task aborted"),
            }
        }
        Ok(results)
    }
}

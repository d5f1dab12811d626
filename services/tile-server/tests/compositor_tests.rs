//! Tests for sub-tile compositing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::Rgba;
use renderer::{LeafRenderer, RenderSettings, RenderedTile};
use tile_common::{SubTileGrid, TileCoord, TileError, TileResult};
use tile_server::{LocalTileFetcher, SubTileFetcher, TileCompositor};

fn renderer() -> LeafRenderer {
    LeafRenderer::from_settings(&RenderSettings {
        max_iterations: 150,
        ..RenderSettings::default()
    })
}

fn compositor(fetcher: Arc<dyn SubTileFetcher>, leaf: u32) -> TileCompositor {
    TileCompositor::new(fetcher, leaf, Duration::from_secs(10), 16)
}

/// Delegates to a local renderer except for one sub-tile, which fails.
struct FailOne {
    inner: LocalTileFetcher,
    fail: TileCoord,
}

#[async_trait]
impl SubTileFetcher for FailOne {
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<RenderedTile> {
        if coord == self.fail {
            return Err(TileError::FetchError("connection refused".to_string()));
        }
        self.inner.fetch(coord, tile_size).await
    }

    fn name(&self) -> &'static str {
        "fail-one"
    }
}

/// Returns a solid tile, or sleeps forever for `stall`.
struct Solid {
    size: u32,
    stall: Option<TileCoord>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Solid {
    fn new(size: u32) -> Self {
        Self {
            size,
            stall: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SubTileFetcher for Solid {
    async fn fetch(&self, coord: TileCoord, _tile_size: u32) -> TileResult<RenderedTile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if Some(coord) == self.stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RenderedTile::from_pixel(self.size, self.size, Rgba([10, 20, 30, 255])))
    }

    fn name(&self) -> &'static str {
        "solid"
    }
}

// ============================================================================
// Completeness
// ============================================================================

#[tokio::test]
async fn test_composite_matches_direct_render() {
    let r = renderer();
    let coord = TileCoord::new(1, 0, 1);
    let fetcher = Arc::new(LocalTileFetcher::new(r.clone(), 1));

    let composite = compositor(fetcher, 32).render(coord, 64).await.unwrap();
    assert_eq!(composite.succeeded, 4);
    assert_eq!(composite.failed, 0);

    let direct = r.render(coord, 64, 1).unwrap();
    assert_eq!(composite.image.as_raw(), direct.as_raw());
}

#[tokio::test]
async fn test_composite_matches_direct_render_oversampled() {
    let r = renderer();
    let coord = TileCoord::new(2, 3, 1);
    let fetcher = Arc::new(LocalTileFetcher::new(r.clone(), 3));

    let composite = compositor(fetcher, 16).render(coord, 64).await.unwrap();
    assert_eq!(composite.succeeded, 16);

    let direct = r.render(coord, 64, 3).unwrap();
    assert_eq!(composite.image.as_raw(), direct.as_raw());
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_one_failed_subtile_leaves_only_its_region_empty() {
    let r = renderer();
    let coord = TileCoord::new(1, 1, 0);
    let grid = SubTileGrid::new(coord, 64, 32).unwrap();
    let failing = grid.iter().nth(3).unwrap();
    let (fx, fy) = grid.pixel_offset(&failing).unwrap();

    let fetcher = Arc::new(FailOne {
        inner: LocalTileFetcher::new(r.clone(), 1),
        fail: failing,
    });
    let composite = compositor(fetcher, 32).render(coord, 64).await.unwrap();
    assert_eq!(composite.image.dimensions(), (64, 64));
    assert_eq!(composite.succeeded, 3);
    assert_eq!(composite.failed, 1);

    let full = r.render(coord, 64, 1).unwrap();
    for (x, y, pixel) in composite.image.enumerate_pixels() {
        let in_failed = x >= fx && x < fx + 32 && y >= fy && y < fy + 32;
        if in_failed {
            assert_eq!(pixel.0, [0, 0, 0, 0], "({}, {})", x, y);
        } else {
            assert_eq!(pixel, full.get_pixel(x, y), "({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn test_timed_out_subtile_is_dropped() {
    let coord = TileCoord::new(0, 0, 0);
    let grid = SubTileGrid::new(coord, 64, 32).unwrap();
    let stall = grid.iter().next().unwrap();

    let fetcher = Arc::new(Solid {
        stall: Some(stall),
        ..Solid::new(32)
    });
    let compositor = TileCompositor::new(fetcher, 32, Duration::from_millis(200), 16);

    let composite = compositor.render(coord, 64).await.unwrap();
    assert_eq!(composite.succeeded, 3);
    assert_eq!(composite.failed, 1);
    assert_eq!(composite.image.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(composite.image.get_pixel(63, 63).0, [10, 20, 30, 255]);
}

#[tokio::test]
async fn test_wrong_size_subtile_is_dropped() {
    // Downstream answers 16px tiles where 32px were requested
    let fetcher = Arc::new(Solid::new(16));
    let composite = compositor(fetcher, 32)
        .render(TileCoord::new(1, 0, 0), 64)
        .await
        .unwrap();
    assert_eq!(composite.succeeded, 0);
    assert_eq!(composite.failed, 4);
    assert!(composite.image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_fan_out_is_bounded() {
    let fetcher = Arc::new(Solid::new(8));
    let compositor = TileCompositor::new(fetcher.clone(), 8, Duration::from_secs(10), 3);

    let composite = compositor.render(TileCoord::new(3, 2, 2), 64).await.unwrap();
    assert_eq!(composite.succeeded, 64);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 64);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_fetch_all_returns_every_subtile() {
    let fetcher = Arc::new(Solid::new(32));
    let compositor = compositor(fetcher, 32);
    let grid = SubTileGrid::new(TileCoord::new(2, 1, 1), 128, 32).unwrap();

    let results = compositor.fetch_all(&grid).await.unwrap();
    assert_eq!(results.len(), 16);
    assert!(results.iter().all(|r| r.is_ok()));

    let mut coords: Vec<_> = results.iter().map(|r| (r.coord.x, r.coord.y)).collect();
    coords.sort();
    let mut expected: Vec<_> = grid.iter().map(|c| (c.x, c.y)).collect();
    expected.sort();
    assert_eq!(coords, expected);
}

#[tokio::test]
async fn test_leaf_sized_request_is_rejected_when_not_a_multiple() {
    let fetcher = Arc::new(Solid::new(32));
    let result = compositor(fetcher, 32).render(TileCoord::new(0, 0, 0), 48).await;
    assert!(matches!(result, Err(TileError::InvalidTileSize(48))));
}

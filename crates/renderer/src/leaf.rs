//! Direct rasterization of a single tile.
//!
//! Tile (x, y) at zoom z, edge `tile_size`, samples the plane on a grid of
//! spacing `1 / (2^z * base_zoom_size * oversample)`. Output pixel (px, py)
//! averages the `oversample x oversample` samples starting at
//! `(x * tile_size + px) * oversample`, and the same for y.
//!
//! Sample positions depend only on the absolute sample index, so a large tile
//! and the grid of smaller tiles covering it produce identical pixels.

use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;
use tile_common::{TileCoord, TileError, TileResult};
use tracing::debug;

use crate::mandelbrot::MandelbrotColorer;
use crate::settings::RenderSettings;
use crate::RenderedTile;

/// Rasterizes tiles by sampling a shared [`MandelbrotColorer`].
///
/// Safe to call concurrently: each render writes only its own buffer.
#[derive(Debug, Clone)]
pub struct LeafRenderer {
    colorer: Arc<MandelbrotColorer>,
    base_zoom_size: f64,
}

impl LeafRenderer {
    pub fn new(colorer: Arc<MandelbrotColorer>, base_zoom_size: f64) -> Self {
        Self {
            colorer,
            base_zoom_size,
        }
    }

    /// Build the ramp and colorer from `settings`.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self::new(
            Arc::new(MandelbrotColorer::from_settings(settings)),
            settings.base_zoom_size,
        )
    }

    pub fn colorer(&self) -> &MandelbrotColorer {
        &self.colorer
    }

    /// Distance in tile space between two adjacent samples.
    pub fn sample_spacing(&self, zoom: u32, oversample: u32) -> f64 {
        let tiles_per_axis = 2f64.powi(zoom.min(i32::MAX as u32) as i32);
        1.0 / (tiles_per_axis * self.base_zoom_size * oversample as f64)
    }

    /// Tile-space position of sample (sx, sy) within a tile, where sample
    /// indices run over `[0, tile_size * oversample)`.
    #[inline]
    pub fn sample_position(
        &self,
        coord: TileCoord,
        tile_size: u32,
        oversample: u32,
        sx: u32,
        sy: u32,
    ) -> Complex64 {
        let scale = self.sample_spacing(coord.z, oversample);
        let span = tile_size as u64 * oversample as u64;
        let ix = coord.x as u64 * span + sx as u64;
        let iy = coord.y as u64 * span + sy as u64;
        Complex64::new(ix as f64 * scale, iy as f64 * scale)
    }

    /// Render `coord` as a `tile_size` square image.
    pub fn render(
        &self,
        coord: TileCoord,
        tile_size: u32,
        oversample: u32,
    ) -> TileResult<RenderedTile> {
        if tile_size == 0 {
            return Err(TileError::InvalidTileSize(0));
        }
        if oversample == 0 {
            return Err(TileError::invalid_parameter(
                "oversample",
                "must be at least 1",
            ));
        }

        debug!(
            tile = %coord,
            tile_size = tile_size,
            oversample = oversample,
            "Rendering leaf tile"
        );

        let width = tile_size as usize;
        let scale = self.sample_spacing(coord.z, oversample);
        let span = tile_size as u64 * oversample as u64;
        let x_origin = coord.x as u64 * span;
        let y_origin = coord.y as u64 * span;
        let os = oversample as u64;
        let samples = (os * os) as u32;

        let mut pixels = vec![0u8; width * width * 4];
        pixels
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(py, row)| {
                let sy0 = y_origin + py as u64 * os;
                for (px, out) in row.chunks_exact_mut(4).enumerate() {
                    let sx0 = x_origin + px as u64 * os;

                    if oversample == 1 {
                        let c = Complex64::new(sx0 as f64 * scale, sy0 as f64 * scale);
                        out.copy_from_slice(&self.colorer.color(c, coord.z).to_array());
                        continue;
                    }

                    let mut sum = [0u32; 4];
                    for dy in 0..os {
                        let im = (sy0 + dy) as f64 * scale;
                        for dx in 0..os {
                            let c = Complex64::new((sx0 + dx) as f64 * scale, im);
                            let color = self.colorer.color(c, coord.z);
                            sum[0] += color.r as u32;
                            sum[1] += color.g as u32;
                            sum[2] += color.b as u32;
                            sum[3] += color.a as u32;
                        }
                    }
                    for (channel, total) in out.iter_mut().zip(sum) {
                        *channel = (total / samples) as u8;
                    }
                }
            });

        if let Some((min, max)) = self.colorer.value_range().snapshot() {
            debug!(tile = %coord, min = min, max = max, "Render done");
        }

        RenderedTile::from_raw(tile_size, tile_size, pixels)
            .ok_or_else(|| TileError::RenderError("pixel buffer size mismatch".to_string()))
    }
}

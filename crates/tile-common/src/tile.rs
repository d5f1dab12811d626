//! Tile addressing and sub-tile decomposition.
//!
//! A tile (z, x, y) covers a square of the fractal plane. Zoom level `z` has
//! 2^z tiles per axis, each at the configured edge size in pixels. A tile of
//! size `n * leaf` at (x, y) covers exactly the leaf tiles
//! `[x*n, x*n + n) x [y*n, y*n + n)` at the same zoom level.

use serde::{Deserialize, Serialize};

use crate::{TileError, TileResult};

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether x and y fall inside the 2^z tile matrix for this zoom.
    ///
    /// Tiles outside the matrix are still renderable (the plane continues
    /// past the viewing window), so this is informational only.
    pub fn is_within_matrix(&self) -> bool {
        if self.z >= 32 {
            return true;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// True if `n` is a positive power of two.
pub fn is_power_of_two(n: i64) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// The grid of leaf-sized sub-tiles that make up one larger tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubTileGrid {
    parent: TileCoord,
    per_side: u32,
    leaf_tile_size: u32,
    x_start: u32,
    y_start: u32,
}

impl SubTileGrid {
    /// Decompose `parent` rendered at `tile_size` into `leaf_tile_size` tiles.
    ///
    /// `tile_size` must be a multiple of `leaf_tile_size`.
    pub fn new(parent: TileCoord, tile_size: u32, leaf_tile_size: u32) -> TileResult<Self> {
        if leaf_tile_size == 0 || tile_size < leaf_tile_size || tile_size % leaf_tile_size != 0 {
            return Err(TileError::InvalidTileSize(tile_size as i64));
        }
        let per_side = tile_size / leaf_tile_size;

        let x_start = parent.x.checked_mul(per_side).ok_or_else(|| {
            TileError::invalid_parameter("x", "sub-tile column overflows at this tile size")
        })?;
        let y_start = parent.y.checked_mul(per_side).ok_or_else(|| {
            TileError::invalid_parameter("y", "sub-tile row overflows at this tile size")
        })?;
        // The last sub-tile must be addressable too.
        x_start
            .checked_add(per_side - 1)
            .ok_or_else(|| TileError::invalid_parameter("x", "sub-tile column overflows"))?;
        y_start
            .checked_add(per_side - 1)
            .ok_or_else(|| TileError::invalid_parameter("y", "sub-tile row overflows"))?;

        Ok(Self {
            parent,
            per_side,
            leaf_tile_size,
            x_start,
            y_start,
        })
    }

    pub fn parent(&self) -> TileCoord {
        self.parent
    }

    /// Number of sub-tiles along one edge.
    pub fn per_side(&self) -> u32 {
        self.per_side
    }

    /// Total number of sub-tiles (per_side²).
    pub fn len(&self) -> usize {
        (self.per_side as usize) * (self.per_side as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.per_side == 0
    }

    pub fn leaf_tile_size(&self) -> u32 {
        self.leaf_tile_size
    }

    /// Absolute coordinates of every sub-tile, row by row.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let z = self.parent.z;
        (self.y_start..self.y_start + self.per_side).flat_map(move |y| {
            (self.x_start..self.x_start + self.per_side).map(move |x| TileCoord { z, x, y })
        })
    }

    /// Pixel offset of `sub` inside the composited image, or `None` if `sub`
    /// is not part of this grid.
    pub fn pixel_offset(&self, sub: &TileCoord) -> Option<(u32, u32)> {
        if sub.z != self.parent.z
            || sub.x < self.x_start
            || sub.y < self.y_start
            || sub.x - self.x_start >= self.per_side
            || sub.y - self.y_start >= self.per_side
        {
            return None;
        }
        Some((
            (sub.x - self.x_start) * self.leaf_tile_size,
            (sub.y - self.y_start) * self.leaf_tile_size,
        ))
    }
}

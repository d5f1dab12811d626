//! Common types shared by the fractal tile renderer and tile server.

pub mod error;
pub mod tile;

pub use error::{TileError, TileResult};
pub use tile::{is_power_of_two, SubTileGrid, TileCoord};

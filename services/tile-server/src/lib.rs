//! Mandelbrot tile server.
//!
//! Serves `/tile` requests either by rendering directly or by splitting the
//! tile into leaf-sized sub-tiles, fetching them from downstream tile servers
//! and compositing the results.

pub mod compositor;
pub mod config;
pub mod fetch;
pub mod handlers;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod service;
pub mod state;

pub use compositor::{Composite, TileCompositor};
pub use config::{parse_tile_servers, Args, TileServerConfig};
pub use fetch::{HttpTileFetcher, LocalTileFetcher, SubTileFetcher, SubTileResult};
pub use pool::TileServerPool;
pub use service::{validate_tile_size, RenderPath, TileService};
pub use state::AppState;

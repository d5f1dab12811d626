//! Mandelbrot tile rendering.
//!
//! Pipeline, leaf-first:
//! - [`ramp`]: cyclic color lookup table built from a few color stops
//! - [`mandelbrot`]: escape-time iteration with smooth coloring
//! - [`leaf`]: rasterizes one tile with box-filter oversampling
//! - [`png`]: PNG encoding (hand-rolled) and decoding (via `image`)

pub mod leaf;
pub mod mandelbrot;
pub mod png;
pub mod ramp;
pub mod settings;

pub use leaf::LeafRenderer;
pub use mandelbrot::{MandelbrotColorer, ValueRange};
pub use ramp::{Color, ColorRamp};
pub use settings::RenderSettings;

/// A rendered tile: RGBA8, row-major.
pub type RenderedTile = image::RgbaImage;

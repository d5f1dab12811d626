//! Rendering knobs and the default palette.

use serde::{Deserialize, Serialize};

use crate::ramp::Color;

/// Green, blue, red, yellow, white.
pub const DEFAULT_COLOR_STOPS: [Color; 5] = [
    Color::rgb(0x00, 0x99, 0x25),
    Color::rgb(0x33, 0x69, 0xE8),
    Color::rgb(0xD5, 0x0F, 0x25),
    Color::rgb(0xEE, 0xB2, 0x11),
    Color::rgb(0xFF, 0xFF, 0xFF),
];

/// Gray, used for points that never escape.
pub const DEFAULT_INTERIOR_COLOR: Color = Color::rgb(0x66, 0x66, 0x66);

/// Parameters shared by every render in the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Escape-time iteration budget. Higher is sharper and slower.
    pub max_iterations: u32,

    /// Size in pixels of the whole set at zoom 0.
    pub base_zoom_size: f64,

    /// Higher values cycle through the ramp faster.
    pub color_density: f64,

    /// Requested number of ramp entries.
    pub ramp_size: usize,

    /// Smoothstep passes applied between stops. More passes give sharper
    /// transitions.
    pub ease_passes: u32,

    /// Samples per axis per output pixel on the direct-render path.
    pub oversample: u32,

    pub color_stops: Vec<Color>,

    pub interior_color: Color,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            base_zoom_size: 400.0,
            color_density: 50.0,
            ramp_size: 5000,
            ease_passes: 2,
            oversample: 3,
            color_stops: DEFAULT_COLOR_STOPS.to_vec(),
            interior_color: DEFAULT_INTERIOR_COLOR,
        }
    }
}

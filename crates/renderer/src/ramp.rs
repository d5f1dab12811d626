//! Color ramp construction.
//!
//! The ramp is a fixed lookup table interpolated between a small set of
//! color stops. Stops are consumed cyclically: the first segment runs from
//! the last stop to the first, so indexing the ramp modulo its length never
//! produces a visible seam.

use serde::{Deserialize, Serialize};

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[u8; 4]> for Color {
    fn from(c: [u8; 4]) -> Self {
        Color::new(c[0], c[1], c[2], c[3])
    }
}

/// Apply the smoothstep curve `t² (3 - 2t)` `passes` times.
///
/// Each pass pushes values further toward 0 or 1.
#[inline]
pub fn ease(mut t: f64, passes: u32) -> f64 {
    for _ in 0..passes {
        t = t * t * (3.0 - 2.0 * t);
    }
    t
}

/// Linear interpolation of every channel, alpha included, rounded to nearest.
///
/// `t` must be in [0, 1]; with valid input colors the result needs no clamp.
#[inline]
pub fn interpolate_color(c1: Color, c2: Color, t: f64) -> Color {
    #[inline(always)]
    fn lerp(a: u8, b: u8, t: f64) -> u8 {
        ((b as f64 - a as f64) * t + a as f64 + 0.5) as u8
    }

    Color::new(
        lerp(c1.r, c2.r, t),
        lerp(c1.g, c2.g, t),
        lerp(c1.b, c2.b, t),
        lerp(c1.a, c2.a, t),
    )
}

/// Precomputed cyclic color lookup table.
///
/// Built once at startup and shared read-only by every render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorRamp {
    colors: Vec<Color>,
    stop_count: usize,
}

impl ColorRamp {
    /// Build a ramp from `stops`.
    ///
    /// `ramp_size` is split evenly across the stops with integer division and
    /// the remainder is dropped, so the produced ramp can be shorter than
    /// requested. Always index with [`ColorRamp::len`], never `ramp_size`.
    pub fn build(stops: &[Color], ramp_size: usize, ease_passes: u32) -> Self {
        if stops.is_empty() {
            return Self {
                colors: Vec::new(),
                stop_count: 0,
            };
        }

        let per_stop = ramp_size / stops.len();
        let mut colors = Vec::with_capacity(per_stop * stops.len());

        let mut prev = stops[stops.len() - 1];
        for &stop in stops {
            for i in 0..per_stop {
                let t = ease(i as f64 / per_stop as f64, ease_passes);
                colors.push(interpolate_color(prev, stop, t));
            }
            prev = stop;
        }

        Self {
            colors,
            stop_count: stops.len(),
        }
    }

    /// Actual number of entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Number of stops the ramp was built from.
    pub fn stop_count(&self) -> usize {
        self.stop_count
    }

    /// Entries per stop segment.
    pub fn segment_len(&self) -> usize {
        if self.stop_count == 0 {
            0
        } else {
            self.colors.len() / self.stop_count
        }
    }

    /// Color at `index`, wrapping modulo the ramp length.
    ///
    /// Returns `None` only for an empty ramp.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Color> {
        if self.colors.is_empty() {
            return None;
        }
        Some(self.colors[index % self.colors.len()])
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }
}

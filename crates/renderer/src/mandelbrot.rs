//! Escape-time Mandelbrot evaluation with continuous coloring.
//!
//! Plane coordinates are in tile space: the whole set fits in the unit
//! square at zoom 0. The colorer maps them into the classic viewing window
//! with `c' = 3.5c - (2.5 + 1.75i)` before iterating.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num_complex::Complex64;

use crate::ramp::{Color, ColorRamp};
use crate::settings::RenderSettings;

const PLANE_SCALE: f64 = 3.5;
const PLANE_OFFSET: Complex64 = Complex64::new(2.5, 1.75);
const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Map a tile-space coordinate into the viewing window.
#[inline]
pub fn to_viewing_window(c: Complex64) -> Complex64 {
    c * PLANE_SCALE - PLANE_OFFSET
}

/// Outcome of iterating a point that left the escape radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escape {
    /// Zero-based iteration at which `|z|² >= 4` first held.
    pub iteration: u32,
    /// Value of `z` at that iteration.
    pub z: Complex64,
}

impl Escape {
    /// Fractional escape count `n - log2(ln|z| / ln 4)`.
    pub fn smooth_value(&self) -> f64 {
        self.iteration as f64 - (self.z.norm().ln() / 4f64.ln()).log2()
    }
}

/// Iterate `z <- z² + c` from zero. `None` if `c` stays bounded for the
/// whole budget.
#[inline]
pub fn escape_time(c: Complex64, max_iterations: u32) -> Option<Escape> {
    let mut z = Complex64::new(0.0, 0.0);
    for iteration in 0..max_iterations {
        z = z * z + c;
        if z.norm_sqr() >= ESCAPE_RADIUS_SQ {
            return Some(Escape { iteration, z });
        }
    }
    None
}

/// Running min/max of the scaled smooth values, for tuning the density.
///
/// Values are always non-negative, so their IEEE-754 bit patterns order the
/// same way as the floats and plain integer min/max on the bits is exact.
#[derive(Debug)]
pub struct ValueRange {
    min_bits: AtomicU64,
    max_bits: AtomicU64,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueRange {
    pub fn new() -> Self {
        Self {
            min_bits: AtomicU64::new(f64::MAX.to_bits()),
            max_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    #[inline]
    pub fn record(&self, value: f64) {
        debug_assert!(value >= 0.0);
        let bits = value.to_bits();
        self.min_bits.fetch_min(bits, Ordering::Relaxed);
        self.max_bits.fetch_max(bits, Ordering::Relaxed);
    }

    /// `(min, max)` observed so far, or `None` before the first escape.
    pub fn snapshot(&self) -> Option<(f64, f64)> {
        let min = f64::from_bits(self.min_bits.load(Ordering::Relaxed));
        let max = f64::from_bits(self.max_bits.load(Ordering::Relaxed));
        if min > max {
            None
        } else {
            Some((min, max))
        }
    }

    pub fn reset(&self) {
        self.min_bits.store(f64::MAX.to_bits(), Ordering::Relaxed);
        self.max_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }
}

/// Colors plane coordinates by escape time.
///
/// Holds only shared read-only state plus the atomic [`ValueRange`], so one
/// instance serves every concurrent render.
#[derive(Debug)]
pub struct MandelbrotColorer {
    ramp: Arc<ColorRamp>,
    interior: Color,
    max_iterations: u32,
    color_density: f64,
    range: ValueRange,
}

impl MandelbrotColorer {
    pub fn new(ramp: Arc<ColorRamp>, settings: &RenderSettings) -> Self {
        Self {
            ramp,
            interior: settings.interior_color,
            max_iterations: settings.max_iterations,
            color_density: settings.color_density,
            range: ValueRange::new(),
        }
    }

    /// Build the ramp described by `settings` and wrap it in a colorer.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let ramp = ColorRamp::build(
            &settings.color_stops,
            settings.ramp_size,
            settings.ease_passes,
        );
        Self::new(Arc::new(ramp), settings)
    }

    pub fn ramp(&self) -> &Arc<ColorRamp> {
        &self.ramp
    }

    pub fn interior_color(&self) -> Color {
        self.interior
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn value_range(&self) -> &ValueRange {
        &self.range
    }

    /// Color for tile-space coordinate `c` at `zoom`.
    #[inline]
    pub fn color(&self, c: Complex64, zoom: u32) -> Color {
        match escape_time(to_viewing_window(c), self.max_iterations) {
            Some(escape) => {
                let v = self.scaled_value(escape.smooth_value(), zoom);
                self.range.record(v);
                self.ramp.get(self.ramp_index(v, zoom)).unwrap_or(self.interior)
            }
            None => self.interior,
        }
    }

    /// Scale a smooth value by the density, slower cycling at deeper zooms.
    #[inline]
    pub fn scaled_value(&self, smooth: f64, zoom: u32) -> f64 {
        smooth.abs() * self.color_density / (zoom.max(1) as f64)
    }

    /// Ramp index for scaled value `v`.
    ///
    /// The zoom-dependent offset shifts the starting color per zoom level so
    /// neighbouring levels don't look identical.
    #[inline]
    pub fn ramp_index(&self, v: f64, zoom: u32) -> usize {
        let len = self.ramp.len() as u64;
        if len == 0 {
            return 0;
        }
        let stops = self.ramp.stop_count().max(1) as u64;
        let offset = len.wrapping_mul(zoom as u64) / stops;
        let base = v.floor() as u64;
        (base.wrapping_add(offset) % len) as usize
    }
}

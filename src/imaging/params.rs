//! Parameter types for image operations.
//!
//! These structs describe *what* to draw, not *how*. The geometry resolver
//! produces a [`Geometry`]; the backend composites according to it.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`Rect`]: Floating-point rectangle in pixel coordinates.
//! - [`Geometry`]: Target canvas size plus source-crop and destination-draw rectangles.
//! - [`SHARPEN_STRENGTH`]: Fixed blend factor for the upscale sharpen pass.
//! - [`MAX_CANVAS_PIXELS`]: Largest output canvas the converter will allocate.

/// Blend factor between the sharpened and original pixels after an upscale.
pub const SHARPEN_STRENGTH: f32 = 0.8;

/// Upper bound on output width × height (100 megapixels, 400 MB of RGBA).
///
/// Larger canvases are rejected as invalid settings before allocation.
pub const MAX_CANVAS_PIXELS: u64 = 100_000_000;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Encoder-facing quality in `[0.01, 1.0]`.
    pub fn as_unit(self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// An axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// A rectangle at the origin.
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// Result of resolving resize settings against a source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Target canvas width.
    pub width: u32,
    /// Target canvas height.
    pub height: u32,
    /// Region of the source to sample.
    pub source: Rect,
    /// Region of the target canvas to draw into.
    pub dest: Rect,
}

impl Geometry {
    /// Destination area exceeds source area.
    pub fn is_upscale(&self, original: (u32, u32)) -> bool {
        (self.width as u64 * self.height as u64) > (original.0 as u64 * original.1 as u64)
    }

    /// Destination does not cover the whole canvas, so a background shows.
    pub fn is_letterboxed(&self) -> bool {
        self.dest != Rect::sized(self.width as f64, self.height as f64)
    }
}

//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Geometry, Rect};
use crate::settings::{ResizeFit, ResizeSpec};

/// Resolve resize settings into a target canvas plus the source-crop and
/// destination-draw rectangles used when compositing.
///
/// | Spec | Canvas | Source | Destination |
/// |---|---|---|---|
/// | `None` | original | full | full |
/// | `Percentage(p)` | `round(orig × p / 100)` | full | full |
/// | `Fixed` + `Fill` | requested | full | full (distorts) |
/// | `Fixed` + `Contain` | requested | full | centered, letterboxed |
/// | `Fixed` + `Cover` | requested | centered crop | full |
///
/// Zero-sized requests are rejected earlier by settings validation; a
/// percentage that rounds to zero is clamped to one pixel.
///
/// # Examples
/// ```
/// # use pixel_convert::imaging::resolve_geometry;
/// # use pixel_convert::settings::{ResizeFit, ResizeSpec};
/// let g = resolve_geometry(
///     (1000, 1000),
///     ResizeSpec::Fixed { width: 500, height: 250, fit: ResizeFit::Cover },
/// );
/// assert_eq!((g.width, g.height), (500, 250));
/// assert_eq!(g.source.height, 500.0);
/// ```
pub fn resolve_geometry(original: (u32, u32), spec: ResizeSpec) -> Geometry {
    let (orig_w, orig_h) = original;
    let full_source = Rect::sized(orig_w as f64, orig_h as f64);

    match spec {
        ResizeSpec::None => Geometry {
            width: orig_w,
            height: orig_h,
            source: full_source,
            dest: full_source,
        },
        ResizeSpec::Percentage(pct) => {
            let width = scale_axis(orig_w, pct);
            let height = scale_axis(orig_h, pct);
            Geometry {
                width,
                height,
                source: full_source,
                dest: Rect::sized(width as f64, height as f64),
            }
        }
        ResizeSpec::Fixed { width, height, fit } => {
            let canvas = Rect::sized(width as f64, height as f64);
            let (source, dest) = match fit {
                ResizeFit::Fill => (full_source, canvas),
                ResizeFit::Contain => (full_source, contain_rect(original, (width, height))),
                ResizeFit::Cover => (cover_crop(original, (width, height)), canvas),
            };
            Geometry {
                width,
                height,
                source,
                dest,
            }
        }
    }
}

fn scale_axis(length: u32, pct: f64) -> u32 {
    ((length as f64 * pct / 100.0).round() as u32).max(1)
}

/// Whether the source is wider than the target, compared by cross
/// multiplication so equal aspect ratios compare exactly.
fn source_is_wider(source: (u32, u32), target: (u32, u32)) -> bool {
    (source.0 as u64 * target.1 as u64) > (source.1 as u64 * target.0 as u64)
}

/// Destination rectangle for a uniform scale that fits the whole source
/// inside the target, centered.
fn contain_rect(source: (u32, u32), target: (u32, u32)) -> Rect {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (tgt_w, tgt_h) = (target.0 as f64, target.1 as f64);

    let (draw_w, draw_h) = if source_is_wider(source, target) {
        // Width is the binding edge
        (tgt_w, src_h * tgt_w / src_w)
    } else {
        (src_w * tgt_h / src_h, tgt_h)
    };

    Rect {
        x: (tgt_w - draw_w) / 2.0,
        y: (tgt_h - draw_h) / 2.0,
        width: draw_w,
        height: draw_h,
    }
}

/// Source rectangle that, scaled by `max(scaleX, scaleY)`, exactly covers the
/// target. The excess is cropped equally from both sides.
fn cover_crop(source: (u32, u32), target: (u32, u32)) -> Rect {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (tgt_w, tgt_h) = (target.0 as f64, target.1 as f64);

    if source_is_wider(source, target) {
        // Height matches, crop the sides
        let crop_w = src_h * tgt_w / tgt_h;
        Rect {
            x: (src_w - crop_w) / 2.0,
            y: 0.0,
            width: crop_w,
            height: src_h,
        }
    } else {
        // Width matches, crop top and bottom
        let crop_h = src_w * tgt_h / tgt_w;
        Rect {
            x: 0.0,
            y: (src_h - crop_h) / 2.0,
            width: src_w,
            height: crop_h,
        }
    }
}

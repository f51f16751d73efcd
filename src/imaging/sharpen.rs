//! Convolution sharpening applied after an upscale.
//!
//! A fixed 3×3 kernel
//!
//! ```text
//!  0 -1  0
//! -1  5 -1
//!  0 -1  0
//! ```
//!
//! is applied to the RGB channels and blended with the original by `mix`.
//! Alpha is copied through untouched.
//!
//! Border pixels only sum the taps that fall inside the image. Out-of-bounds
//! taps are dropped rather than clamped to the edge or zero-padded, so the
//! kernel no longer sums to one along the border and edge pixels come out
//! slightly brighter. Interior pixels are unaffected.

use image::RgbaImage;

const KERNEL: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];

/// Sharpen `src`, blending `out = mix × convolved + (1 − mix) × original` per
/// RGB channel.
pub fn sharpen(src: &RgbaImage, mix: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut dst = RgbaImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];

            for (ky, row) in KERNEL.iter().enumerate() {
                let sy = y as i64 + ky as i64 - 1;
                if sy < 0 || sy >= h as i64 {
                    continue;
                }
                for (kx, &weight) in row.iter().enumerate() {
                    let sx = x as i64 + kx as i64 - 1;
                    if weight == 0.0 || sx < 0 || sx >= w as i64 {
                        continue;
                    }
                    let tap = src.get_pixel(sx as u32, sy as u32);
                    for (c, sum) in acc.iter_mut().enumerate() {
                        *sum += tap[c] as f32 * weight;
                    }
                }
            }

            let original = src.get_pixel(x, y);
            let out = dst.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended = mix * acc[c] + (1.0 - mix) * original[c] as f32;
                out[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            out[3] = original[3];
        }
    }

    dst
}

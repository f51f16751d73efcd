//! Shared test utilities for the pixel-convert test suite.
//!
//! Builds synthetic image bytes with the real encoders so decode paths are
//! exercised end to end, and queue fixtures for scheduler tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let queue = Queue::new(ConversionSettings::initial());
//! let ids = add_mock_images(&queue, &[(800, 600), (10, 10)]);
//! assert_eq!(queue.len(), 2);
//! ```

use crate::imaging::backend::tests::mock_image;
use crate::queue::{IncomingFile, ItemId, Queue};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

// =========================================================================
// Synthetic images
// =========================================================================

/// A small valid JPEG with a two-axis gradient.
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A small valid PNG with a gradient and constant alpha of 200.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 64, 200])
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

// =========================================================================
// Queue fixtures
// =========================================================================

/// Enqueue mock-decodable images named `img-N.png`.
pub fn add_mock_images(queue: &Queue, sizes: &[(u32, u32)]) -> Vec<ItemId> {
    let files = sizes
        .iter()
        .enumerate()
        .map(|(i, &(w, h))| IncomingFile {
            name: format!("img-{i}.png"),
            mime: Some("image/png".into()),
            bytes: mock_image(w, h),
        })
        .collect();
    queue.add_files(files).accepted
}

/// Enqueue a file the mock backend cannot decode.
pub fn add_corrupt_image(queue: &Queue, name: &str) -> ItemId {
    queue
        .add_files(vec![IncomingFile {
            name: name.into(),
            mime: Some("image/jpeg".into()),
            bytes: b"\xFF\xD8 truncated".to_vec(),
        }])
        .accepted[0]
}

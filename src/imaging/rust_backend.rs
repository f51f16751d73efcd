//! Pure Rust raster backend on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG | `PngEncoder` (lossless, quality ignored) |
//! | Encode → WebP | `WebPEncoder::new_lossless` (quality ignored) |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//!
//! The WebP encoder is lossless only, so quality has no effect on its output.
//! The quality search detects this through its probes and keeps the full
//! quality result.

use super::backend::{BackendError, Dimensions, Encoded, RasterBackend};
use crate::settings::OutputFormat;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::LazyLock;

/// Input extensions with a compiled-in decoder.
///
/// AVIF is an output format only here. The `"avif"` feature builds the rav1e
/// encoder but no decoder, even though `reading_enabled()` reports AVIF as
/// readable, so it is left off this list.
const DECODE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    DECODE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// AV1 encoder speed: 1 is slowest/best, 10 fastest.
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    Ok(ImageReader::new(Cursor::new(bytes)).with_guessed_format()?)
}

/// Map `[0, 1]` quality to the 1–100 scale the codecs take.
fn codec_quality(quality: Option<f32>) -> u8 {
    quality
        .map(|q| (q * 100.0).round().clamp(1.0, 100.0) as u8)
        .unwrap_or(92)
}

fn encode_jpeg(surface: &RgbaImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha; the converter pre-fills white so dropping it is lossless here
    let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            surface.as_raw(),
            surface.width(),
            surface.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| BackendError::Encode(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_webp(surface: &RgbaImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    WebPEncoder::new_lossless(&mut buf)
        .write_image(
            surface.as_raw(),
            surface.width(),
            surface.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| BackendError::Encode(format!("WebP encode failed: {e}")))?;
    Ok(buf)
}

fn encode_avif(surface: &RgbaImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality)
        .write_image(
            surface.as_raw(),
            surface.width(),
            surface.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

impl RasterBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = reader(bytes)?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
        let img = reader(bytes)?
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(img.into_rgba8())
    }

    fn encode(
        &self,
        surface: &RgbaImage,
        format: OutputFormat,
        quality: Option<f32>,
    ) -> Result<Encoded, BackendError> {
        let bytes = match format {
            OutputFormat::Jpg => encode_jpeg(surface, codec_quality(quality))?,
            OutputFormat::Png => encode_png(surface)?,
            OutputFormat::Webp => encode_webp(surface)?,
            OutputFormat::Avif => encode_avif(surface, codec_quality(quality))?,
        };
        Ok(Encoded { bytes, format })
    }
}

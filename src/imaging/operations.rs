//! High-level image operations.
//!
//! [`Converter`] turns one input file plus its settings into an encoded
//! output. It combines the pure calculations with backend execution:
//!
//! ```text
//! HEIC? → decode via adapter
//!       → backend.decode
//!       → resolve geometry
//!       → composite onto canvas (white fill for JPEG, HEIC, contain)
//!       → sharpen if upscaled
//!       → encode (direct quality, or quality search against a byte budget)
//!       → verify the encoder honoured the format
//! ```
//!
//! Every failure is terminal for the item and surfaces as a [`ConvertError`].
//! Temporary surfaces are owned locally and dropped as soon as the next stage
//! no longer needs them.

use super::backend::{BackendError, RasterBackend};
use super::calculations::resolve_geometry;
use super::heic::{HeicDecoder, HeicError, decode_heic, is_heic};
use super::params::{Geometry, MAX_CANVAS_PIXELS, Quality, SHARPEN_STRENGTH};
use super::quality_search::{SearchOutcome, find_optimal_quality};
use super::sharpen::sharpen;
use crate::settings::{ConversionSettings, InvalidSettings, OutputFormat, ResizeFit, ResizeSpec};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    InvalidSettings(#[from] InvalidSettings),
    #[error("Failed to load image: {0}")]
    Decode(String),
    #[error("HEIC decoder is not available, reload and try again")]
    HeicDecoderUnavailable,
    #[error("Failed to decode HEIC image: {0}")]
    HeicDecode(String),
    #[error("{} encoding is not supported in this environment", .0.extension().to_uppercase())]
    FormatNotSupported(OutputFormat),
    #[error("Failed to convert image: {0}")]
    EncodeFailed(String),
}

impl From<HeicError> for ConvertError {
    fn from(err: HeicError) -> Self {
        match err {
            HeicError::Unavailable => Self::HeicDecoderUnavailable,
            HeicError::Failed(msg) => Self::HeicDecode(msg),
        }
    }
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Raw input as the user supplied it.
#[derive(Debug, Clone, Copy)]
pub struct SourceImage<'a> {
    pub name: &'a str,
    pub mime: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// A finished conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Quality in `[0.01, 1.0]` chosen by the target-size search, if one ran.
    pub derived_quality: Option<f32>,
    pub search: Option<SearchOutcome>,
}

impl Converted {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Predicted result of converting with a target size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub size: u64,
    /// Derived quality, 1–100.
    pub quality: u8,
    pub met_target: bool,
}

/// Single-item converter bound to a raster backend and an optional HEIC decoder.
///
/// Output-format support is probed once per format and cached for the life
/// of the converter.
pub struct Converter<B> {
    backend: B,
    heic: Option<Box<dyn HeicDecoder>>,
    capabilities: Mutex<HashMap<OutputFormat, bool>>,
}

impl<B: RasterBackend> Converter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            heic: None,
            capabilities: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_heic_decoder(mut self, decoder: impl HeicDecoder + 'static) -> Self {
        self.heic = Some(Box::new(decoder));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the backend really encodes `format`.
    ///
    /// JPEG and PNG are assumed. Other formats are probed by encoding a 1×1
    /// surface and checking what comes back.
    pub fn supports(&self, format: OutputFormat) -> bool {
        if format.is_baseline() {
            return true;
        }
        let mut cache = self
            .capabilities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache.entry(format).or_insert_with(|| {
            let probe = RgbaImage::from_pixel(1, 1, WHITE);
            let supported = self
                .backend
                .encode(&probe, format, Some(1.0))
                .is_ok_and(|out| out.format == format && !out.is_empty());
            debug!(%format, supported, "probed encoder capability");
            supported
        })
    }

    pub fn supported_output_formats(&self) -> Vec<OutputFormat> {
        OutputFormat::ALL
            .into_iter()
            .filter(|f| self.supports(*f))
            .collect()
    }

    /// Convert one input according to `settings`.
    pub fn convert(&self, input: &SourceImage<'_>, settings: &ConversionSettings) -> Result<Converted> {
        settings.validate()?;
        let format = settings.output_format;
        if !self.supports(format) {
            return Err(ConvertError::FormatNotSupported(format));
        }

        let from_heic = is_heic(input.name, input.mime);
        let source = if from_heic {
            let decoded = decode_heic(self.heic.as_deref(), input.bytes)?;
            self.load(&decoded)?
        } else {
            self.load(input.bytes)?
        };

        let original = source.dimensions();
        let spec = settings.resize_spec();
        let geometry = resolve_geometry(original, spec);
        check_canvas(&geometry)?;
        let letterbox = matches!(
            spec,
            ResizeSpec::Fixed {
                fit: ResizeFit::Contain,
                ..
            }
        );
        let background = (format == OutputFormat::Jpg || from_heic || letterbox).then_some(WHITE);

        let mut canvas = composite(&source, &geometry, background);
        drop(source);

        if geometry.is_upscale(original) {
            info!(name = input.name, "upscale detected, sharpening");
            canvas = sharpen(&canvas, SHARPEN_STRENGTH);
        }

        let (encoded, derived_quality, search) = match settings.target_bytes() {
            Some(target) => {
                let found = find_optimal_quality(&self.backend, &canvas, format, target)
                    .map_err(encode_error)?;
                debug!(
                    name = input.name,
                    quality = found.quality,
                    size = found.encoded.len(),
                    target,
                    outcome = ?found.outcome,
                    "quality search finished"
                );
                (found.encoded, Some(found.quality), Some(found.outcome))
            }
            None => {
                let quality = format
                    .is_lossy()
                    .then(|| Quality::new(settings.quality as u32).as_unit());
                let encoded = self
                    .backend
                    .encode(&canvas, format, quality)
                    .map_err(encode_error)?;
                (encoded, None, None)
            }
        };

        if encoded.format != format {
            return Err(ConvertError::FormatNotSupported(format));
        }
        if encoded.is_empty() {
            return Err(ConvertError::EncodeFailed("encoder returned no data".into()));
        }

        Ok(Converted {
            bytes: encoded.bytes,
            format,
            width: geometry.width,
            height: geometry.height,
            derived_quality,
            search,
        })
    }

    /// Run a target-size conversion and report the size and quality it
    /// settles on, without keeping the output.
    pub fn estimate(&self, input: &SourceImage<'_>, settings: &ConversionSettings) -> Result<Estimate> {
        let Some(target) = settings.target_bytes() else {
            return Err(InvalidSettings(
                "an estimate needs a target file size and a lossy output format".into(),
            )
            .into());
        };
        let converted = self.convert(input, settings)?;
        let quality = converted.derived_quality.unwrap_or(1.0);
        Ok(Estimate {
            size: converted.size(),
            quality: (quality * 100.0).round().clamp(1.0, 100.0) as u8,
            met_target: converted.size() <= target,
        })
    }

    fn load(&self, bytes: &[u8]) -> Result<RgbaImage> {
        let image = self
            .backend
            .decode(bytes)
            .map_err(|e| ConvertError::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ConvertError::Decode("image has no pixels".into()));
        }
        Ok(image)
    }
}

fn check_canvas(geometry: &Geometry) -> std::result::Result<(), InvalidSettings> {
    let pixels = u64::from(geometry.width) * u64::from(geometry.height);
    if pixels > MAX_CANVAS_PIXELS {
        return Err(InvalidSettings(format!(
            "output size {}×{} exceeds the {} megapixel limit",
            geometry.width,
            geometry.height,
            MAX_CANVAS_PIXELS / 1_000_000
        )));
    }
    Ok(())
}

fn encode_error(err: BackendError) -> ConvertError {
    ConvertError::EncodeFailed(err.to_string())
}

/// Draw the source rectangle of `source` into the destination rectangle of a
/// fresh canvas, Lanczos3-resampled.
///
/// Without a background the canvas starts transparent and the scaled source
/// replaces its pixels; with one, the source is alpha-blended on top.
pub fn composite(source: &RgbaImage, geometry: &Geometry, background: Option<Rgba<u8>>) -> RgbaImage {
    let mut canvas = match background {
        Some(color) => RgbaImage::from_pixel(geometry.width, geometry.height, color),
        None => RgbaImage::new(geometry.width, geometry.height),
    };

    let (src_w, src_h) = source.dimensions();
    let crop = geometry.source;
    let crop_x = (crop.x.round() as u32).min(src_w - 1);
    let crop_y = (crop.y.round() as u32).min(src_h - 1);
    let crop_w = (crop.width.round() as u32).clamp(1, src_w - crop_x);
    let crop_h = (crop.height.round() as u32).clamp(1, src_h - crop_y);

    let region = if (crop_x, crop_y, crop_w, crop_h) == (0, 0, src_w, src_h) {
        None
    } else {
        Some(imageops::crop_imm(source, crop_x, crop_y, crop_w, crop_h).to_image())
    };
    let region = region.as_ref().unwrap_or(source);

    let dest = geometry.dest;
    let draw_w = (dest.width.round() as u32).max(1);
    let draw_h = (dest.height.round() as u32).max(1);
    let scaled = if region.dimensions() == (draw_w, draw_h) {
        None
    } else {
        Some(imageops::resize(region, draw_w, draw_h, FilterType::Lanczos3))
    };
    let scaled = scaled.as_ref().unwrap_or(region);

    let (x, y) = (dest.x.round() as i64, dest.y.round() as i64);
    if background.is_some() {
        imageops::overlay(&mut canvas, scaled, x, y);
    } else {
        imageops::replace(&mut canvas, scaled, x, y);
    }
    canvas
}

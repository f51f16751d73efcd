//! Raster backend trait and shared types.
//!
//! The [`RasterBackend`] trait is the seam between the conversion pipeline and
//! whatever actually decodes and encodes pixels. It mirrors what a browser
//! canvas offers: identify, decode to an RGBA surface, and encode a surface to
//! a target format at an optional quality.
//!
//! Encoders report the format they *actually* produced. A backend may
//! legitimately substitute a different one (the browser `toBlob` fallback), so
//! callers must compare it with what they asked for.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use crate::settings::OutputFormat;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// An encoded blob and the format the encoder really used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

impl Encoded {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Trait for raster backends.
///
/// `Sync` so a single backend can be shared by every worker of a batch.
pub trait RasterBackend: Sync {
    /// Read pixel dimensions without a full decode where possible.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode arbitrary image bytes into an RGBA surface.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError>;

    /// Encode a surface. `quality` is in `[0, 1]`; `None` means the encoder
    /// default (and is what lossless formats receive).
    fn encode(
        &self,
        surface: &RgbaImage,
        format: OutputFormat,
        quality: Option<f32>,
    ) -> Result<Encoded, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock backend that records operations and fakes pixel work.
    ///
    /// Decodable bytes are produced by [`mock_image`]: a `MOCK` tag followed by
    /// little-endian width and height. Anything else fails to decode.
    ///
    /// Encoded size is a deterministic, monotonic function of quality so the
    /// quality search can be exercised without a real codec.
    /// Uses Mutex (not RefCell) so it is Sync and works across rayon workers.
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// Bytes produced at quality 0 and added per unit of quality.
        pub base_size: usize,
        pub size_per_quality: usize,
        /// Report this format instead of the requested one.
        pub substitute: Option<OutputFormat>,
        /// Produce the same size regardless of quality.
        pub ignore_quality: bool,
        /// Return an empty blob instead of an error.
        pub empty_output: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify,
        Decode { width: u32, height: u32 },
        Encode {
            format: OutputFormat,
            quality: Option<f32>,
            width: u32,
            height: u32,
        },
    }

    pub fn mock_image(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"MOCK".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes
    }

    fn parse_mock(bytes: &[u8]) -> Result<Dimensions, BackendError> {
        if bytes.len() != 12 || &bytes[..4] != b"MOCK" {
            return Err(BackendError::Decode("not a mock image".into()));
        }
        let width = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let height = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        Ok(Dimensions { width, height })
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self {
                operations: Mutex::new(Vec::new()),
                base_size: 1_000,
                size_per_quality: 100_000,
                substitute: None,
                ignore_quality: false,
                empty_output: false,
            }
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Encoded size the mock produces at `quality`.
        pub fn size_at(&self, quality: f32) -> usize {
            if self.ignore_quality {
                return self.base_size + self.size_per_quality;
            }
            self.base_size + (quality * self.size_per_quality as f32) as usize
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn encode_qualities(&self) -> Vec<Option<f32>> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Encode { quality, .. } => Some(quality),
                    _ => None,
                })
                .collect()
        }
    }

    impl RasterBackend for MockBackend {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Identify);
            parse_mock(bytes)
        }

        fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
            let dims = parse_mock(bytes)?;
            self.operations.lock().unwrap().push(RecordedOp::Decode {
                width: dims.width,
                height: dims.height,
            });
            Ok(RgbaImage::from_fn(dims.width, dims.height, |x, y| {
                image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
            }))
        }

        fn encode(
            &self,
            surface: &RgbaImage,
            format: OutputFormat,
            quality: Option<f32>,
        ) -> Result<Encoded, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                format,
                quality,
                width: surface.width(),
                height: surface.height(),
            });
            let len = if self.empty_output {
                0
            } else {
                self.size_at(quality.unwrap_or(1.0))
            };
            Ok(Encoded {
                bytes: vec![0u8; len],
                format: self.substitute.unwrap_or(format),
            })
        }
    }

    #[test]
    fn mock_decodes_its_own_images() {
        let backend = MockBackend::new();
        let img = backend.decode(&mock_image(40, 30)).unwrap();
        assert_eq!(img.dimensions(), (40, 30));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Decode {
                width: 40,
                height: 30
            }
        ));
    }

    #[test]
    fn mock_rejects_foreign_bytes() {
        let backend = MockBackend::new();
        assert!(backend.decode(b"not an image").is_err());
        assert!(backend.identify(b"").is_err());
    }

    #[test]
    fn mock_size_grows_with_quality() {
        let backend = MockBackend::new();
        let surface = RgbaImage::new(2, 2);
        let low = backend.encode(&surface, OutputFormat::Jpg, Some(0.1)).unwrap();
        let high = backend.encode(&surface, OutputFormat::Jpg, Some(0.9)).unwrap();
        assert!(low.len() < high.len());
        assert_eq!(high.format, OutputFormat::Jpg);
    }

    #[test]
    fn mock_reports_substituted_format() {
        let backend = MockBackend {
            substitute: Some(OutputFormat::Png),
            ..MockBackend::default()
        };
        let out = backend
            .encode(&RgbaImage::new(1, 1), OutputFormat::Avif, Some(1.0))
            .unwrap();
        assert_eq!(out.format, OutputFormat::Png);
    }
}

//! Image conversion, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **HEIC input** | injected [`HeicDecoder`] |
//! | **Resize** | `imageops::resize` (Lanczos3) onto a composited canvas |
//! | **Upscale sharpen** | 3×3 convolution, blended at 0.8 |
//! | **Encode** | JPEG, PNG, WebP (lossless), AVIF via rav1e |
//!
//! The module is split into:
//! - **Calculations**: pure geometry resolution (unit testable)
//! - **Parameters**: data structures describing what to draw
//! - **Backend**: [`RasterBackend`] trait + [`RustBackend`]
//! - **Quality search**: target-size bisection over the backend's encoder
//! - **Operations**: [`Converter`], combining all of the above per item

pub mod backend;
mod calculations;
pub mod heic;
pub mod operations;
mod params;
pub mod quality_search;
pub mod rust_backend;
mod sharpen;

pub use backend::{BackendError, Dimensions, Encoded, RasterBackend};
pub use calculations::resolve_geometry;
pub use heic::{HeicDecoder, HeicOutput};
pub use operations::{ConvertError, Converted, Converter, Estimate, SourceImage};
pub use params::{Geometry, MAX_CANVAS_PIXELS, Quality, Rect, SHARPEN_STRENGTH};
pub use quality_search::{QualitySearch, SearchOutcome, find_optimal_quality};
pub use rust_backend::{RustBackend, supported_input_extensions};
pub use sharpen::sharpen;

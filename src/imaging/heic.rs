//! HEIC/HEIF input adapter.
//!
//! HEIC is not decodable by the raster backend. An external [`HeicDecoder`]
//! turns it into a standard raster (JPEG-equivalent bytes) first. The decoder
//! is an injected capability that may be missing in a given deployment; that
//! case fails fast with [`HeicError::Unavailable`] instead of attempting the
//! decode.
//!
//! Decoders are known to occasionally hand the input back unconverted. The
//! adapter sniffs the result and rejects anything that is not a recognizable
//! raster container.

use image::ImageFormat;
use thiserror::Error;
use tracing::debug;

const HEIC_MIME_TYPES: &[&str] = &["image/heic", "image/heif"];
const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeicError {
    #[error("HEIC decoder is not available, reload and try again")]
    Unavailable,
    #[error("HEIC decode failed: {0}")]
    Failed(String),
}

/// What an external decoder returns: one image, or one per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeicOutput {
    Single(Vec<u8>),
    Multiple(Vec<Vec<u8>>),
}

impl HeicOutput {
    /// Only the first image is used.
    fn into_first(self) -> Option<Vec<u8>> {
        match self {
            Self::Single(bytes) => Some(bytes),
            Self::Multiple(list) => list.into_iter().next(),
        }
    }
}

/// External HEIC/HEIF decoder capability.
pub trait HeicDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<HeicOutput, String>;
}

/// Either signal is enough: a HEIC MIME type or a `.heic`/`.heif` file name.
pub fn is_heic(name: &str, mime: Option<&str>) -> bool {
    let by_mime = mime.is_some_and(|m| {
        HEIC_MIME_TYPES
            .iter()
            .any(|heic| m.trim().eq_ignore_ascii_case(heic))
    });
    let by_name = name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| HEIC_EXTENSIONS.iter().any(|h| ext.eq_ignore_ascii_case(h)));
    by_mime || by_name
}

/// Decode HEIC bytes into bytes the raster backend can load.
pub fn decode_heic(decoder: Option<&dyn HeicDecoder>, bytes: &[u8]) -> Result<Vec<u8>, HeicError> {
    let decoder = decoder.ok_or(HeicError::Unavailable)?;

    let decoded = decoder
        .decode(bytes)
        .map_err(HeicError::Failed)?
        .into_first()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| HeicError::Failed("decoder returned no image".into()))?;

    match image::guess_format(&decoded) {
        Ok(ImageFormat::Avif) | Err(_) => Err(HeicError::Failed(
            "decoder returned data that is not a standard raster".into(),
        )),
        Ok(format) => {
            debug!(?format, size = decoded.len(), "decoded HEIC input");
            Ok(decoded)
        }
    }
}

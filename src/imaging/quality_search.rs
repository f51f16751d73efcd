//! Target-size quality search.
//!
//! Finds the highest encoder quality whose output fits a byte budget by
//! binary search over `[0.01, 1.0]`.
//!
//! Two probes run first, at quality 1.0 and 0.01, to detect environments where
//! a search is meaningless:
//!
//! - the encoder substituted a different format than requested, or
//! - the encoder ignores quality (both probes produce the same size).
//!
//! In both cases, and when the 1.0 probe already fits, the 1.0 result is
//! returned as-is. Otherwise ten halvings narrow the range to about 0.1 %.
//! If no midpoint fits, the 0.01 probe is the answer.

use super::backend::{BackendError, Encoded, RasterBackend};
use crate::settings::OutputFormat;
use image::RgbaImage;
use tracing::debug;

pub const MIN_QUALITY: f32 = 0.01;
pub const MAX_QUALITY: f32 = 1.0;
pub const SEARCH_ITERATIONS: usize = 10;

/// Why the search stopped where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Full quality already fits the budget.
    FitsAtFullQuality,
    /// The encoder did not produce the requested format.
    FormatNotHonored,
    /// The encoder ignores the quality parameter.
    QualityIgnored,
    /// Binary search found a quality under budget.
    Searched,
    /// No midpoint fit. The lowest probe is returned whether or not it fits.
    Unattainable,
}

#[derive(Debug, Clone)]
pub struct QualitySearch {
    pub encoded: Encoded,
    /// Quality in `[0.01, 1.0]` that produced `encoded`.
    pub quality: f32,
    pub outcome: SearchOutcome,
}

impl QualitySearch {
    /// Whether the returned blob is within the budget it was searched for.
    pub fn met_target(&self, target_bytes: u64) -> bool {
        self.encoded.len() <= target_bytes
    }
}

/// Find the highest quality whose encoded size is at most `target_bytes`.
pub fn find_optimal_quality(
    backend: &impl RasterBackend,
    surface: &RgbaImage,
    format: OutputFormat,
    target_bytes: u64,
) -> Result<QualitySearch, BackendError> {
    let high_probe = backend.encode(surface, format, Some(MAX_QUALITY))?;

    if high_probe.format != format {
        debug!(
            requested = %format,
            actual = %high_probe.format,
            "encoder fell back to another format, skipping quality search"
        );
        return Ok(full_quality(high_probe, SearchOutcome::FormatNotHonored));
    }
    if high_probe.len() <= target_bytes {
        debug!(
            size = high_probe.len(),
            target = target_bytes,
            "target met at full quality"
        );
        return Ok(full_quality(high_probe, SearchOutcome::FitsAtFullQuality));
    }

    let low_probe = backend.encode(surface, format, Some(MIN_QUALITY))?;
    if low_probe.len() == high_probe.len() {
        debug!(%format, "encoder ignores quality, skipping quality search");
        return Ok(full_quality(high_probe, SearchOutcome::QualityIgnored));
    }

    debug!(
        high = high_probe.len(),
        low = low_probe.len(),
        target = target_bytes,
        "starting quality search"
    );

    let mut low = MIN_QUALITY;
    let mut high = MAX_QUALITY;
    let mut best: Option<(f32, Encoded)> = None;

    for _ in 0..SEARCH_ITERATIONS {
        let mid = (low + high) / 2.0;
        let candidate = backend.encode(surface, format, Some(mid))?;

        if candidate.len() <= target_bytes {
            best = Some((mid, candidate));
            low = mid;
        } else {
            high = mid;
        }
    }

    Ok(match best {
        Some((quality, encoded)) => QualitySearch {
            encoded,
            quality,
            outcome: SearchOutcome::Searched,
        },
        None => {
            debug!(
                size = low_probe.len(),
                target = target_bytes,
                "target unattainable, using lowest quality"
            );
            QualitySearch {
                encoded: low_probe,
                quality: MIN_QUALITY,
                outcome: SearchOutcome::Unattainable,
            }
        }
    })
}

fn full_quality(encoded: Encoded, outcome: SearchOutcome) -> QualitySearch {
    QualitySearch {
        encoded,
        quality: MAX_QUALITY,
        outcome,
    }
}

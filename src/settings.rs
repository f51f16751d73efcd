//! Per-item conversion settings.
//!
//! Every queue item owns a private [`ConversionSettings`] copied from the
//! global defaults when it is enqueued. After that the copy is independently
//! mutable: the settings panel edits it through a [`SettingsPatch`], and the
//! [`Selection`] decides whether a patch fans out to every item (batch mode)
//! or only to the selected ones.
//!
//! ## Quality vs. target size
//!
//! `quality` and `target_file_size` are mutually exclusive sources of truth for
//! lossy encoders. When a target size is set the quality is *derived* by the
//! quality search and written back after conversion; it is never read as user
//! input in that mode. PNG ignores both.

use crate::queue::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Settings failed validation before any pixel work was attempted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid settings: {0}")]
pub struct InvalidSettings(pub String);

/// Output encodings the converter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Jpg, Self::Png, Self::Webp, Self::Avif];

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Canonical file extension. `jpg` maps to `jpg`, the rest to their own name.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Whether the encoder takes a quality parameter at all.
    pub fn is_lossy(self) -> bool {
        !matches!(self, Self::Png)
    }

    /// Formats every environment can encode without probing.
    pub fn is_baseline(self) -> bool {
        matches!(self, Self::Jpg | Self::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = InvalidSettings;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            other => Err(InvalidSettings(format!("unknown output format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    None,
    Percentage,
    Fixed,
}

impl FromStr for ResizeMode {
    type Err = InvalidSettings;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "percentage" | "percent" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(InvalidSettings(format!("unknown resize mode: {other}"))),
        }
    }
}

/// How a source maps into a fixed-size destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFit {
    /// Fit entirely inside, letterboxed on white.
    Contain,
    /// Cover the whole target, cropping the centered excess.
    Cover,
    /// Stretch to the exact target, ignoring aspect ratio.
    Fill,
}

impl FromStr for ResizeFit {
    type Err = InvalidSettings;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(Self::Contain),
            "cover" => Ok(Self::Cover),
            "fill" => Ok(Self::Fill),
            other => Err(InvalidSettings(format!("unknown resize fit: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    #[serde(rename = "KB")]
    Kb,
    #[serde(rename = "MB")]
    Mb,
}

impl SizeUnit {
    pub fn bytes(self) -> f64 {
        match self {
            Self::Kb => 1024.0,
            Self::Mb => 1024.0 * 1024.0,
        }
    }
}

impl FromStr for SizeUnit {
    type Err = InvalidSettings;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KB" | "K" => Ok(Self::Kb),
            "MB" | "M" => Ok(Self::Mb),
            other => Err(InvalidSettings(format!("unknown size unit: {other}"))),
        }
    }
}

/// The resize request in typed form, as consumed by the geometry resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeSpec {
    None,
    Percentage(f64),
    Fixed { width: u32, height: u32, fit: ResizeFit },
}

/// Conversion settings for a single queue item.
///
/// Serialized in camelCase so saved defaults stay readable next to the
/// settings panel field names. Missing fields fall back to
/// [`ConversionSettings::initial`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionSettings {
    pub output_format: OutputFormat,
    /// 1–100, only meaningful for lossy formats.
    pub quality: u8,
    pub resize_mode: ResizeMode,
    pub resize_percentage: f64,
    pub resize_width: u32,
    pub resize_height: u32,
    pub resize_fit: ResizeFit,
    pub maintain_aspect_ratio: bool,
    pub locked_ratio: Option<f64>,
    pub target_file_size: Option<f64>,
    pub target_file_size_unit: SizeUnit,
}

impl ConversionSettings {
    /// Stock defaults used before anything is configured or saved.
    pub fn initial() -> Self {
        Self {
            output_format: OutputFormat::Webp,
            quality: 85,
            resize_mode: ResizeMode::Percentage,
            resize_percentage: 100.0,
            resize_width: 1920,
            resize_height: 1080,
            resize_fit: ResizeFit::Contain,
            maintain_aspect_ratio: true,
            locked_ratio: None,
            target_file_size: None,
            target_file_size_unit: SizeUnit::Kb,
        }
    }

    pub fn resize_spec(&self) -> ResizeSpec {
        match self.resize_mode {
            ResizeMode::None => ResizeSpec::None,
            ResizeMode::Percentage => ResizeSpec::Percentage(self.resize_percentage),
            ResizeMode::Fixed => ResizeSpec::Fixed {
                width: self.resize_width,
                height: self.resize_height,
                fit: self.resize_fit,
            },
        }
    }

    /// Byte budget for the quality search, or `None` when quality is read directly.
    ///
    /// PNG is lossless, so a target size never applies to it.
    pub fn target_bytes(&self) -> Option<u64> {
        if !self.output_format.is_lossy() {
            return None;
        }
        self.target_file_size
            .map(|size| (size * self.target_file_size_unit.bytes()) as u64)
    }

    /// Reject settings the geometry resolver and encoder cannot honour.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if !(1..=100).contains(&self.quality) {
            return Err(InvalidSettings(format!(
                "quality must be 1-100, got {}",
                self.quality
            )));
        }
        match self.resize_mode {
            ResizeMode::None => {}
            ResizeMode::Percentage => {
                if !self.resize_percentage.is_finite() || self.resize_percentage <= 0.0 {
                    return Err(InvalidSettings(
                        "resize percentage must be positive".into(),
                    ));
                }
            }
            ResizeMode::Fixed => {
                if self.resize_width == 0 || self.resize_height == 0 {
                    return Err(InvalidSettings(
                        "resize width and height must be non-zero".into(),
                    ));
                }
            }
        }
        if self
            .target_file_size
            .is_some_and(|size| !size.is_finite() || size <= 0.0)
        {
            return Err(InvalidSettings("target file size must be positive".into()));
        }
        Ok(())
    }

    /// The ratio used for proportional edits: the locked snapshot, or the
    /// current width/height.
    fn edit_ratio(&self) -> f64 {
        self.locked_ratio
            .unwrap_or(self.resize_width as f64 / self.resize_height.max(1) as f64)
    }

    /// Set the fixed width, recomputing height when the aspect ratio is locked.
    pub fn set_width(&mut self, width: u32) {
        if self.maintain_aspect_ratio {
            let ratio = self.edit_ratio();
            self.resize_height = (width as f64 / ratio).round() as u32;
            self.locked_ratio = Some(ratio);
        }
        self.resize_width = width;
    }

    /// Set the fixed height, recomputing width when the aspect ratio is locked.
    pub fn set_height(&mut self, height: u32) {
        if self.maintain_aspect_ratio {
            let ratio = self.edit_ratio();
            self.resize_width = (height as f64 * ratio).round() as u32;
            self.locked_ratio = Some(ratio);
        }
        self.resize_height = height;
    }

    /// Toggling the lock on snapshots the current ratio; off clears it.
    pub fn set_maintain_aspect_ratio(&mut self, on: bool) {
        self.maintain_aspect_ratio = on;
        self.locked_ratio =
            on.then(|| self.resize_width as f64 / self.resize_height.max(1) as f64);
    }

    /// Apply a ratio preset (e.g. 16:9): switch to fixed mode and derive the
    /// height from the current width.
    pub fn apply_ratio(&mut self, ratio: f64) {
        self.resize_mode = ResizeMode::Fixed;
        self.resize_height = (self.resize_width as f64 / ratio).round() as u32;
        self.maintain_aspect_ratio = true;
        self.locked_ratio = Some(ratio);
    }

    /// Seed fixed dimensions from the decoded source once they are known.
    pub fn seed_dimensions(&mut self, width: u32, height: u32) {
        self.resize_width = width;
        self.resize_height = height;
        self.locked_ratio = Some(width as f64 / height.max(1) as f64);
    }

    /// Adopt the quality the target-size search derived (`q` in `[0, 1]`).
    pub fn adopt_derived_quality(&mut self, q: f32) {
        self.quality = (q * 100.0).round().clamp(1.0, 100.0) as u8;
    }
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self::initial()
    }
}

/// A partial settings update. `None` leaves the field untouched.
///
/// Nullable fields (`locked_ratio`, `target_file_size`) use a nested option so
/// a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub output_format: Option<OutputFormat>,
    pub quality: Option<u8>,
    pub resize_mode: Option<ResizeMode>,
    pub resize_percentage: Option<f64>,
    pub resize_width: Option<u32>,
    pub resize_height: Option<u32>,
    pub resize_fit: Option<ResizeFit>,
    pub maintain_aspect_ratio: Option<bool>,
    pub locked_ratio: Option<Option<f64>>,
    pub target_file_size: Option<Option<f64>>,
    pub target_file_size_unit: Option<SizeUnit>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, settings: &mut ConversionSettings) {
        if let Some(v) = self.output_format {
            settings.output_format = v;
        }
        if let Some(v) = self.quality {
            settings.quality = v;
        }
        if let Some(v) = self.resize_mode {
            settings.resize_mode = v;
        }
        if let Some(v) = self.resize_percentage {
            settings.resize_percentage = v;
        }
        if let Some(v) = self.resize_width {
            settings.resize_width = v;
        }
        if let Some(v) = self.resize_height {
            settings.resize_height = v;
        }
        if let Some(v) = self.resize_fit {
            settings.resize_fit = v;
        }
        if let Some(v) = self.maintain_aspect_ratio {
            settings.maintain_aspect_ratio = v;
        }
        if let Some(v) = self.locked_ratio {
            settings.locked_ratio = v;
        }
        if let Some(v) = self.target_file_size {
            settings.target_file_size = v;
        }
        if let Some(v) = self.target_file_size_unit {
            settings.target_file_size_unit = v;
        }
    }

    pub fn applied_to(&self, settings: &ConversionSettings) -> ConversionSettings {
        let mut out = settings.clone();
        self.apply(&mut out);
        out
    }
}

/// Which items a settings edit targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Nothing selected: edits apply to the global defaults and every item.
    #[default]
    Batch,
    /// Edits apply only to these items. The last id is the "primary" one whose
    /// settings the panel shows.
    Items(Vec<ItemId>),
}

impl Selection {
    pub fn contains(&self, id: ItemId) -> bool {
        match self {
            Self::Batch => true,
            Self::Items(ids) => ids.contains(&id),
        }
    }

    pub fn primary(&self) -> Option<ItemId> {
        match self {
            Self::Batch => None,
            Self::Items(ids) => ids.last().copied(),
        }
    }
}

/// The settings an item will actually be converted with, given the UI's
/// current selection.
///
/// In batch mode every item mirrors the global defaults; once a selection
/// exists items carry their own independently edited copies.
pub fn effective_settings(
    item_settings: &ConversionSettings,
    global: &ConversionSettings,
    selection: &Selection,
) -> ConversionSettings {
    match selection {
        Selection::Batch => global.clone(),
        Selection::Items(_) => item_settings.clone(),
    }
}

/// Pick a usable default output format when the preferred one cannot be
/// encoded: WebP if available, otherwise JPEG.
pub fn fallback_format(preferred: OutputFormat, supported: &[OutputFormat]) -> OutputFormat {
    if supported.contains(&preferred) {
        preferred
    } else if supported.contains(&OutputFormat::Webp) {
        OutputFormat::Webp
    } else {
        OutputFormat::Jpg
    }
}

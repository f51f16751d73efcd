//! Application configuration.
//!
//! Loaded with [confique](https://docs.rs/confique) from, in order of
//! precedence:
//!
//! 1. `PIXEL_CONVERT_*` environment variables
//! 2. a TOML file (`pixel-convert.toml` in the working directory, or `--config`)
//! 3. stock defaults declared on the structs below
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [defaults]
//! output_format = "webp"      # jpg | png | webp | avif
//! quality = 85                # 1-100, lossy formats only
//! resize_mode = "percentage"  # none | percentage | fixed
//! resize_percentage = 100.0
//! resize_width = 1920
//! resize_height = 1080
//! resize_fit = "contain"      # contain | cover | fill
//! maintain_aspect_ratio = true
//! # target_file_size = 200.0  # derive quality from a size budget
//! target_file_size_unit = "KB"
//!
//! [processing]
//! workers = 3                 # Images converted at the same time
//!
//! [output]
//! archive_name = "converted-images.zip"
//! preferences_file = "pixel-settings.json"
//! ```
//!
//! Run `pixel-convert gen-config` for the same template with full comments.

use crate::settings::{ConversionSettings, OutputFormat, ResizeFit, ResizeMode, SizeUnit};
use confique::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pixel-convert.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] confique::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Config, Debug, Clone)]
pub struct AppConfig {
    /// Settings every newly added image starts with.
    #[config(nested)]
    pub defaults: DefaultsConfig,
    /// Batch conversion.
    #[config(nested)]
    pub processing: ProcessingConfig,
    /// Where results go.
    #[config(nested)]
    pub output: OutputConfig,
}

#[derive(Config, Debug, Clone)]
pub struct DefaultsConfig {
    /// Output format: jpg, png, webp or avif.
    #[config(default = "webp")]
    pub output_format: OutputFormat,
    /// Encoder quality 1-100. Ignored for png and when a target size is set.
    #[config(default = 85, env = "PIXEL_CONVERT_QUALITY")]
    pub quality: u8,
    /// none, percentage or fixed.
    #[config(default = "percentage")]
    pub resize_mode: ResizeMode,
    /// Scale in percent when resize_mode = "percentage".
    #[config(default = 100.0)]
    pub resize_percentage: f64,
    /// Target width when resize_mode = "fixed".
    #[config(default = 1920)]
    pub resize_width: u32,
    /// Target height when resize_mode = "fixed".
    #[config(default = 1080)]
    pub resize_height: u32,
    /// contain (letterbox), cover (crop) or fill (stretch).
    #[config(default = "contain")]
    pub resize_fit: ResizeFit,
    /// Keep width and height proportional when one of them is edited.
    #[config(default = true)]
    pub maintain_aspect_ratio: bool,
    /// Size budget per output file. When set, quality is searched for.
    pub target_file_size: Option<f64>,
    /// Unit of target_file_size: KB or MB.
    #[config(default = "KB")]
    pub target_file_size_unit: SizeUnit,
}

#[derive(Config, Debug, Clone)]
pub struct ProcessingConfig {
    /// Number of images converted at the same time. Must be at least 1.
    #[config(default = 3, env = "PIXEL_CONVERT_WORKERS")]
    pub workers: usize,
}

#[derive(Config, Debug, Clone)]
pub struct OutputConfig {
    /// File name of the archive holding every converted image.
    #[config(default = "converted-images.zip", env = "PIXEL_CONVERT_ARCHIVE_NAME")]
    pub archive_name: String,
    /// JSON file holding saved default settings.
    #[config(default = "pixel-settings.json", env = "PIXEL_CONVERT_PREFERENCES")]
    pub preferences_file: PathBuf,
}

impl DefaultsConfig {
    pub fn to_settings(&self) -> ConversionSettings {
        ConversionSettings {
            output_format: self.output_format,
            quality: self.quality,
            resize_mode: self.resize_mode,
            resize_percentage: self.resize_percentage,
            resize_width: self.resize_width,
            resize_height: self.resize_height,
            resize_fit: self.resize_fit,
            maintain_aspect_ratio: self.maintain_aspect_ratio,
            locked_ratio: None,
            target_file_size: self.target_file_size,
            target_file_size_unit: self.target_file_size_unit,
        }
    }
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.workers == 0 {
            return Err(ConfigError::Validation(
                "processing.workers must be at least 1".into(),
            ));
        }
        if self.output.archive_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output.archive_name must not be empty".into(),
            ));
        }
        self.defaults
            .to_settings()
            .validate()
            .map_err(|e| ConfigError::Validation(format!("defaults: {e}")))
    }
}

/// Load configuration, layering env over `path` (or the default file if it
/// exists) over stock defaults, then validate.
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };
    let config = AppConfig::builder().env().file(file).load()?;
    config.validate()?;
    Ok(config)
}

/// Fully commented stock configuration, generated from the struct docs.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> String {
    confique::toml::template::<AppConfig>(confique::toml::FormatOptions::default())
}

use clap::{Parser, Subcommand};
use pixel_convert::batch::BatchScheduler;
use pixel_convert::config::{self, AppConfig};
use pixel_convert::imaging::{Converter, RustBackend, SourceImage, supported_input_extensions};
use pixel_convert::package;
use pixel_convert::preferences::PreferencesStore;
use pixel_convert::queue::{IncomingFile, Queue, mime_from_name};
use pixel_convert::settings::{
    ConversionSettings, OutputFormat, ResizeFit, ResizeMode, SettingsPatch, SizeUnit,
    fallback_format,
};
use pixel_convert::output;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pixel-convert")]
#[command(about = "Batch image converter")]
#[command(long_about = "\
Batch image converter

Converts images between JPEG, PNG, WebP and AVIF, optionally resizing them
and searching for the highest quality that fits a target file size.

Resize modes:
  none        keep the original dimensions
  percentage  scale both sides (--percent 50)
  fixed       exact canvas (--width/--height) with a fit:
                contain  fit inside, letterboxed on white
                cover    fill the canvas, cropping the centered excess
                fill     stretch to the exact size

Defaults come from pixel-convert.toml, PIXEL_CONVERT_* variables and
saved defaults ('pixel-convert defaults save'), in that order of precedence
from last to first.

Run 'pixel-convert gen-config' to generate a documented pixel-convert.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: pixel-convert.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Conversion settings flags shared by several commands.
#[derive(clap::Args, Clone, Default)]
struct SettingsArgs {
    /// Output format: jpg, png, webp or avif
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Quality 1-100 for lossy formats
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Resize mode: none, percentage or fixed
    #[arg(long)]
    resize: Option<ResizeMode>,

    /// Scale in percent (implies --resize percentage)
    #[arg(long)]
    percent: Option<f64>,

    /// Target width (implies --resize fixed)
    #[arg(long)]
    width: Option<u32>,

    /// Target height (implies --resize fixed)
    #[arg(long)]
    height: Option<u32>,

    /// How a fixed size is filled: contain, cover or fill
    #[arg(long)]
    fit: Option<ResizeFit>,

    /// Aspect ratio preset like 16:9 (implies --resize fixed)
    #[arg(long, value_parser = parse_ratio)]
    ratio: Option<f64>,

    /// Do not keep proportions when only one of width/height is given
    #[arg(long)]
    free_ratio: bool,

    /// Target file size; quality is searched to fit it
    #[arg(long)]
    target_size: Option<f64>,

    /// Unit of --target-size: KB or MB
    #[arg(long)]
    unit: Option<SizeUnit>,
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let ratio = match s.split_once(':') {
        Some((w, h)) => {
            let w: f64 = w.trim().parse().map_err(|_| format!("bad ratio width: {w}"))?;
            let h: f64 = h.trim().parse().map_err(|_| format!("bad ratio height: {h}"))?;
            w / h
        }
        None => s.trim().parse().map_err(|_| format!("bad ratio: {s}"))?,
    };
    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(format!("ratio must be positive: {s}"))
    }
}

impl SettingsArgs {
    /// The plain field overrides. Proportional edits are applied separately.
    fn patch(&self) -> SettingsPatch {
        let implied_mode = if self.width.is_some() || self.height.is_some() || self.ratio.is_some() {
            Some(ResizeMode::Fixed)
        } else if self.percent.is_some() {
            Some(ResizeMode::Percentage)
        } else {
            None
        };
        SettingsPatch {
            output_format: self.format,
            quality: self.quality,
            resize_mode: self.resize.or(implied_mode),
            resize_percentage: self.percent,
            resize_fit: self.fit,
            target_file_size: self.target_size.map(Some),
            target_file_size_unit: self.unit,
            ..SettingsPatch::default()
        }
    }

    /// Apply every flag, editing width/height the way the settings panel does.
    fn apply(&self, settings: &mut ConversionSettings) {
        self.patch().apply(settings);
        if self.free_ratio {
            settings.set_maintain_aspect_ratio(false);
        }
        if let Some(ratio) = self.ratio {
            settings.apply_ratio(ratio);
        }
        match (self.width, self.height) {
            (Some(width), Some(height)) => {
                settings.resize_width = width;
                settings.resize_height = height;
                if settings.maintain_aspect_ratio {
                    settings.locked_ratio = Some(width as f64 / height.max(1) as f64);
                }
            }
            (Some(width), None) => settings.set_width(width),
            (None, Some(height)) => settings.set_height(height),
            (None, None) => {}
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Convert images and write the results
    Convert {
        /// Input image files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Write one ZIP archive instead of individual files
        #[arg(long)]
        zip: bool,

        /// Images converted at the same time (overrides config)
        #[arg(long)]
        workers: Option<usize>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Estimate output size and quality for a target file size
    Estimate {
        /// Input image file
        input: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// List which output formats this build can encode
    Formats,
    /// Print a stock pixel-convert.toml with all options documented
    GenConfig,
    /// Show, save or clear the saved default settings
    Defaults {
        #[command(subcommand)]
        action: DefaultsAction,
    },
}

#[derive(Subcommand)]
enum DefaultsAction {
    /// Print the defaults new images start with
    Show,
    /// Save the current defaults with the given changes
    Save {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Forget saved defaults
    Clear,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let app_config = config::load_config(cli.config.as_deref())?;
    let preferences = PreferencesStore::new(&app_config.output.preferences_file);
    let defaults = preferences.load_or(&app_config.defaults.to_settings());

    match cli.command {
        Command::Convert {
            inputs,
            out,
            zip,
            workers,
            settings,
        } => convert(&app_config, defaults, &inputs, &out, zip, workers, &settings)?,
        Command::Estimate { input, settings } => {
            let converter = Converter::new(RustBackend::new());
            let mut effective = defaults;
            settings.apply(&mut effective);
            let Some(target) = effective.target_bytes() else {
                return Err("estimate needs --target-size and a lossy --format".into());
            };
            let (name, bytes) = read_input(&input)?;
            let source = SourceImage {
                name: &name,
                mime: mime_from_name(&name),
                bytes: &bytes,
            };
            let estimate = converter.estimate(&source, &effective)?;
            println!("{}", output::format_estimate(&name, &estimate, target));
        }
        Command::Formats => {
            let converter = Converter::new(RustBackend::new());
            output::print_lines(&output::format_output_formats(
                &converter.supported_output_formats(),
            ));
            println!("Input formats");
            println!("    {}", supported_input_extensions().join(" "));
            println!("    heic heif: not available (no decoder configured)");
        }
        Command::Defaults { action } => match action {
            DefaultsAction::Show => {
                if preferences.has_saved() {
                    println!("Saved in {}", preferences.path().display());
                } else {
                    println!("Using configured defaults");
                }
                output::print_lines(&output::format_settings(&defaults));
            }
            DefaultsAction::Save { settings } => {
                let mut updated = defaults;
                settings.apply(&mut updated);
                updated.validate()?;
                preferences.save(&updated)?;
                println!("Saved defaults to {}", preferences.path().display());
                output::print_lines(&output::format_settings(&updated));
            }
            DefaultsAction::Clear => {
                if preferences.clear()? {
                    println!("Cleared saved defaults");
                } else {
                    println!("No saved defaults");
                }
            }
        },
        Command::GenConfig => {}
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<(String, Vec<u8>), std::io::Error> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((name, bytes))
}

fn convert(
    app_config: &AppConfig,
    mut defaults: ConversionSettings,
    inputs: &[PathBuf],
    out: &Path,
    zip: bool,
    workers: Option<usize>,
    settings: &SettingsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let converter = Converter::new(RustBackend::new());
    if settings.format.is_none() && !converter.supports(defaults.output_format) {
        let fallback = fallback_format(
            defaults.output_format,
            &converter.supported_output_formats(),
        );
        warn!(
            preferred = %defaults.output_format,
            fallback = %fallback,
            "default output format not supported, falling back"
        );
        defaults.output_format = fallback;
    }

    let queue = Queue::new(defaults.clone());
    queue.set_saved_defaults(defaults);

    let mut files = Vec::with_capacity(inputs.len());
    for path in inputs {
        let (name, bytes) = read_input(path)?;
        let mime = mime_from_name(&name).map(str::to_string);
        files.push(IncomingFile { name, mime, bytes });
    }
    let report = queue.add_files(files);
    for name in &report.rejected {
        println!("{name}: skipped, not a supported image");
    }
    if report.accepted.is_empty() {
        return Err("no supported images to convert".into());
    }

    queue.populate_dimensions(converter.backend());
    for id in &report.accepted {
        queue.edit_item_settings(*id, |item| settings.apply(item));
    }

    let scheduler = BatchScheduler::new(workers.unwrap_or(app_config.processing.workers));
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_lines(&output::format_batch_event(&event));
        }
    });
    let summary = scheduler.run(&queue, &converter, Some(tx))?;
    printer.join().map_err(|_| "output thread panicked")?;

    println!();
    println!("{}", output::format_batch_summary(&summary, queue.len()));

    if zip {
        match package::download_all(&queue.items(), &app_config.output.archive_name) {
            Ok(archive) => {
                let path = archive.write_to(out)?;
                println!(
                    "Wrote {} ({})",
                    path.display(),
                    output::format_file_size(archive.bytes.len() as u64)
                );
            }
            Err(package::PackageError::NothingToPackage) => {
                println!("Nothing to package");
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        for item in queue.completed() {
            let artifact = package::download_one(&item)?;
            let path = artifact.write_to(out)?;
            info!(path = %path.display(), "wrote output");
        }
    }

    if summary.failed > 0 && summary.done == 0 {
        return Err("every image failed to convert".into());
    }
    Ok(())
}

//! CLI output formatting.
//!
//! Each item leads with its zero-padded queue index and original file name;
//! details follow on the same line or as indented context lines.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! 001 beach.png → beach.webp  1920×1080, 412.3 KB
//! 002 notes.heic: error: HEIC decoder is not available, reload and try again
//! 003 cat.jpg → cat.jpg  800×600, 49.8 KB (quality 62)
//!
//! Converted 2 of 3 images, 1 failed
//! Wrote converted-images.zip (462.1 KB)
//! ```
//!
//! ## Formats
//!
//! ```text
//! Output formats
//!     jpg   supported
//!     png   supported
//!     webp  supported
//!     avif  not supported
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>` or `String`) for
//! testability, and `print_lines` writes to stdout. Format functions are pure.

use crate::batch::{BatchEvent, BatchSummary};
use crate::imaging::Estimate;
use crate::naming::output_file_name;
use crate::queue::ItemId;
use crate::settings::{ConversionSettings, OutputFormat, ResizeMode, SizeUnit};

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a queue id as a 3-digit zero-padded index.
fn format_index(id: ItemId) -> String {
    format!("{:0>3}", id.0)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: base 1024, one decimal, trailing `.0` dropped.
///
/// ```
/// use pixel_convert::output::format_file_size;
/// assert_eq!(format_file_size(0), "0 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// assert_eq!(format_file_size(1_048_576), "1 MB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.1}");
    let trimmed = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Format one scheduler event. `Started` events produce nothing; the line
/// is printed once the item settles.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { .. } => Vec::new(),
        BatchEvent::Finished {
            id,
            name,
            format,
            width,
            height,
            size,
            derived_quality,
        } => {
            let mut line = format!(
                "{} {} → {}  {}×{}, {}",
                format_index(*id),
                name,
                output_file_name(name, *format),
                width,
                height,
                format_file_size(*size)
            );
            if let Some(q) = derived_quality {
                line.push_str(&format!(" (quality {q})"));
            }
            vec![line]
        }
        BatchEvent::Failed { id, name, error } => {
            vec![format!("{} {}: error: {}", format_index(*id), name, error)]
        }
        BatchEvent::Requeued { id, name } => vec![format!(
            "{} {}: settings changed, converting again",
            format_index(*id),
            name
        )],
    }
}

/// Closing line of a conversion run.
pub fn format_batch_summary(summary: &BatchSummary, total: usize) -> String {
    let mut line = format!("Converted {} of {} images", summary.done, total);
    if summary.failed > 0 {
        line.push_str(&format!(", {} failed", summary.failed));
    }
    line
}

/// Capability table for the `formats` command.
pub fn format_output_formats(supported: &[OutputFormat]) -> Vec<String> {
    let mut lines = vec!["Output formats".to_string()];
    for format in OutputFormat::ALL {
        let status = if supported.contains(&format) {
            "supported"
        } else {
            "not supported"
        };
        lines.push(format!("{}{:<5} {}", indent(1), format.extension(), status));
    }
    lines
}

/// Settings as `key: value` lines, for `defaults show`.
pub fn format_settings(settings: &ConversionSettings) -> Vec<String> {
    let mut lines = vec![format!("Format: {}", settings.output_format)];
    match settings.target_file_size {
        Some(size) if settings.output_format.is_lossy() => lines.push(format!(
            "Target size: {} {}",
            size,
            match settings.target_file_size_unit {
                SizeUnit::Kb => "KB",
                SizeUnit::Mb => "MB",
            }
        )),
        _ if settings.output_format.is_lossy() => {
            lines.push(format!("Quality: {}", settings.quality))
        }
        _ => {}
    }
    let resize = match settings.resize_mode {
        ResizeMode::None => "original size".to_string(),
        ResizeMode::Percentage => format!("{}%", settings.resize_percentage),
        ResizeMode::Fixed => format!(
            "{}×{} ({:?})",
            settings.resize_width, settings.resize_height, settings.resize_fit
        )
        .to_lowercase(),
    };
    lines.push(format!("Resize: {resize}"));
    lines.push(format!(
        "Aspect ratio: {}",
        if settings.maintain_aspect_ratio {
            "locked"
        } else {
            "free"
        }
    ));
    lines
}

/// Result of the `estimate` command.
pub fn format_estimate(name: &str, estimate: &Estimate, target_bytes: u64) -> String {
    let verdict = if estimate.met_target {
        "fits"
    } else {
        "over budget at lowest quality"
    };
    format!(
        "{name}: ~{} at quality {} ({verdict}, target {})",
        format_file_size(estimate.size),
        estimate.quality,
        format_file_size(target_bytes)
    )
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

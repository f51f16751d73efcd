//! # Pixel Convert
//!
//! A batch image converter. Images are added to a queue, each carrying its own
//! conversion settings (output format, quality or target file size, resize
//! mode), converted by a bounded pool of workers, and handed back one by one or
//! as a single ZIP archive.
//!
//! # Architecture: Queue, Scheduler, Converter
//!
//! ```text
//! files ──▶ Queue ──claim──▶ BatchScheduler (K workers) ──▶ Converter ──▶ Converted
//!             ▲                      │                          │
//!             └───────finish─────────┘                   RasterBackend
//!                                                          (decode, resize, encode)
//! ```
//!
//! - The [`queue`] owns item state. A worker *claims* a pending item, which
//!   atomically moves it to converting, and *finishes* it with the result.
//!   Settings edits bump a per-item revision, so a result computed from
//!   outdated settings is discarded and the item goes back to pending.
//! - The [`batch`] scheduler never runs more than K conversions at once and
//!   keeps going when an item fails.
//! - The [`imaging`] converter is pure with respect to its inputs: source bytes
//!   plus settings in, encoded bytes out. All pixel work goes through the
//!   [`imaging::RasterBackend`] trait so the pipeline logic is testable without
//!   encoding real images.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`settings`] | Conversion settings, enums, edit rules (aspect lock, ratio presets) and patches |
//! | [`queue`] | Item store: intake filtering, per-item settings, claim/finish state machine, progress |
//! | [`batch`] | Bounded-concurrency scheduler over the queue, with progress events |
//! | [`imaging`] | Geometry resolution, sharpen filter, quality search, HEIC adapter, converter |
//! | [`naming`] | Output file names (`photo.jpeg` → `photo.webp`) |
//! | [`package`] | Single-file download artifacts and the stored ZIP archive |
//! | [`config`] | `pixel-convert.toml` + environment loading via confique |
//! | [`preferences`] | Saved default settings as JSON |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Target Size Beats Quality
//!
//! When a target file size is set for a lossy format, the quality field is
//! ignored and a binary search over encoder quality finds the highest quality
//! whose output fits. The derived quality is written back to the item so a
//! second run starts from what worked.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate only. Formats the build cannot
//! encode are detected with a one-pixel probe and reported as not supported
//! instead of failing halfway through a batch.

pub mod batch;
pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod package;
pub mod preferences;
pub mod queue;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_helpers;

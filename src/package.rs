//! Artifact packaging: one converted file, or a ZIP of every completed item.
//!
//! Archive entries are named by [`output_file_name`]. Two items that map to
//! the same name collide; the later one wins, as it would when writing the
//! same path twice, and the collision is logged. Entries are stored without
//! recompression since every output format is already compressed.

use crate::imaging::Converted;
use crate::naming::output_file_name;
use crate::queue::{ItemStatus, QueueItem};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const DEFAULT_ARCHIVE_NAME: &str = "converted-images.zip";
pub const ZIP_MIME: &str = "application/zip";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("{name} has not been converted yet")]
    NotReady { name: String },
    #[error("no converted images to download")]
    NothingToPackage,
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write into `dir` under the artifact's own name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, PackageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        debug!(path = %path.display(), size = self.bytes.len(), "wrote artifact");
        Ok(path)
    }
}

/// Package a single completed item.
pub fn download_one(item: &QueueItem) -> Result<Artifact, PackageError> {
    let output = item
        .output()
        .filter(|out| !out.bytes.is_empty())
        .ok_or_else(|| PackageError::NotReady {
            name: item.name.clone(),
        })?;
    Ok(Artifact {
        file_name: output_file_name(&item.name, output.format),
        mime: output.mime(),
        bytes: output.bytes.clone(),
    })
}

/// Package every completed item with output into one ZIP archive.
///
/// Items in any other state are skipped.
pub fn download_all(items: &[QueueItem], archive_name: &str) -> Result<Artifact, PackageError> {
    let mut entries: Vec<(String, Arc<Converted>)> = Vec::new();
    for item in items.iter().filter(|item| item.status() == ItemStatus::Done) {
        let Some(output) = item.output().filter(|out| !out.bytes.is_empty()) else {
            continue;
        };
        let name = output_file_name(&item.name, output.format);
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                warn!(name = %name, item = %item.id, "archive name collision, later item replaces earlier");
                entry.1 = Arc::clone(output);
            }
            None => entries.push((name, Arc::clone(output))),
        }
    }
    if entries.is_empty() {
        return Err(PackageError::NothingToPackage);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, output) in &entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&output.bytes)?;
    }
    let bytes = zip.finish()?.into_inner();
    debug!(entries = entries.len(), size = bytes.len(), "built archive");

    Ok(Artifact {
        file_name: archive_name.to_string(),
        mime: ZIP_MIME,
        bytes,
    })
}

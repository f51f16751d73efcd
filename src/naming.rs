//! Output file naming.
//!
//! A converted file keeps the original base name and takes the canonical
//! extension of its output format:
//! - `holiday.HEIC` → `holiday.jpg`
//! - `scan.final.tiff` → `scan.final.webp` (only the last extension is dropped)
//! - `README` → `README.png`

use crate::settings::OutputFormat;

/// Used when stripping the extension leaves nothing, as for `.png`.
const FALLBACK_BASE: &str = "image";

/// Strip the last extension: a dot followed by at least one character that
/// is neither a dot nor a path separator, at the very end of the name.
pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => {
            let ext = &name[dot + 1..];
            if ext.is_empty() || ext.contains('/') {
                name
            } else {
                &name[..dot]
            }
        }
        None => name,
    }
}

/// File name for a converted output.
pub fn output_file_name(original: &str, format: OutputFormat) -> String {
    let base = base_name(original);
    let base = if base.is_empty() { FALLBACK_BASE } else { base };
    format!("{base}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_extension() {
        assert_eq!(base_name("photo.jpg"), "photo");
        assert_eq!(base_name("IMG_0001.HEIC"), "IMG_0001");
    }

    #[test]
    fn strips_only_last_extension() {
        assert_eq!(base_name("archive.tar.gz"), "archive.tar");
    }

    #[test]
    fn no_extension_is_unchanged() {
        assert_eq!(base_name("README"), "README");
        assert_eq!(base_name("trailing."), "trailing.");
    }

    #[test]
    fn dot_in_directory_is_not_an_extension() {
        assert_eq!(base_name("my.photos/raw"), "my.photos/raw");
    }

    #[test]
    fn output_name_uses_canonical_extension() {
        assert_eq!(output_file_name("cat.jpeg", OutputFormat::Jpg), "cat.jpg");
        assert_eq!(output_file_name("cat.png", OutputFormat::Webp), "cat.webp");
        assert_eq!(output_file_name("cat", OutputFormat::Avif), "cat.avif");
    }

    #[test]
    fn dotfile_falls_back_to_generic_base() {
        assert_eq!(output_file_name(".png", OutputFormat::Png), "image.png");
    }
}

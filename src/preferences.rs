//! Saved default settings.
//!
//! Defaults are stored as a camelCase JSON object. Loading overlays whatever
//! keys the file has onto a base (the configured defaults), so files written by
//! older versions with fewer fields still load. A file that cannot be read or
//! parsed is logged and ignored rather than failing the run.

use crate::settings::ConversionSettings;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PreferencesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved JSON object, if there is a readable one.
    fn read_saved(&self) -> Option<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read saved defaults");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(value @ Value::Object(_)) => Some(value),
            Ok(_) => {
                warn!(path = %self.path.display(), "saved defaults are not a JSON object, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not parse saved defaults");
                None
            }
        }
    }

    pub fn has_saved(&self) -> bool {
        self.read_saved().is_some()
    }

    /// Saved defaults merged over `base`, or `base` itself when nothing usable
    /// is saved.
    pub fn load_or(&self, base: &ConversionSettings) -> ConversionSettings {
        let Some(saved) = self.read_saved() else {
            return base.clone();
        };
        let merged = match serde_json::to_value(base) {
            Ok(base_value) => merge_json(base_value, saved),
            Err(e) => {
                warn!(error = %e, "could not serialize base settings");
                return base.clone();
            }
        };
        match serde_json::from_value::<ConversionSettings>(merged) {
            Ok(settings) if settings.validate().is_ok() => {
                debug!(path = %self.path.display(), "loaded saved defaults");
                settings
            }
            Ok(_) => {
                warn!(path = %self.path.display(), "saved defaults are out of range, ignoring");
                base.clone()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "saved defaults have invalid values, ignoring");
                base.clone()
            }
        }
    }

    pub fn save(&self, settings: &ConversionSettings) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "saved defaults");
        Ok(())
    }

    /// Remove the saved defaults. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, PreferencesError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Overlay the keys of `overlay` onto `base`. Objects merge recursively,
/// anything else replaces.
pub fn merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_json(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

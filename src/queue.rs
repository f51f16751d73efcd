//! The shared item list.
//!
//! A [`Queue`] owns every [`QueueItem`] plus the global default settings. It
//! is shared between whoever edits settings and the batch workers, so every
//! mutation happens under one lock and lands as a single update: status,
//! output and error never change separately.
//!
//! ## Item lifecycle
//!
//! ```text
//!  add_files ──► Pending ──claim──► Converting ──finish──► Done | Error
//!                  ▲                    │                      │
//!                  └──── settings change (stale result) ◄──────┘
//! ```
//!
//! Every settings change bumps the item's revision. A worker that finishes
//! with an older revision than the item now carries has converted stale
//! settings, so its result is discarded and the item goes back to pending.

use crate::imaging::heic::is_heic;
use crate::imaging::{Converted, Dimensions, RasterBackend};
use crate::settings::{ConversionSettings, Selection, SettingsPatch, effective_settings};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// MIME types accepted at enqueue. HEIC/HEIF files are also accepted by name.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
    "image/avif",
    "image/tiff",
    "image/bmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Converting,
    Done,
    Error,
}

/// Status together with what it carries.
#[derive(Debug, Clone)]
pub enum ItemState {
    Pending,
    Converting,
    Done(Arc<Converted>),
    Error(String),
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Pending => ItemStatus::Pending,
            Self::Converting => ItemStatus::Converting,
            Self::Done(_) => ItemStatus::Done,
            Self::Error(_) => ItemStatus::Error,
        }
    }
}

/// A file as handed over by the caller.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Guess a MIME type from a file name's extension.
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => return None,
    })
}

/// Whether a file passes the input filter.
pub fn is_accepted(name: &str, mime: Option<&str>) -> bool {
    let by_mime = mime.is_some_and(|m| {
        ACCEPTED_MIME_TYPES
            .iter()
            .any(|accepted| m.trim().eq_ignore_ascii_case(accepted))
    });
    by_mime || is_heic(name, mime)
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: ItemId,
    pub name: String,
    pub mime: Option<String>,
    pub size: u64,
    pub bytes: Arc<Vec<u8>>,
    /// Populated once the header has been probed.
    pub dimensions: Option<Dimensions>,
    pub settings: ConversionSettings,
    pub state: ItemState,
    revision: u64,
}

impl QueueItem {
    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn output(&self) -> Option<&Arc<Converted>> {
        match &self.state {
            ItemState::Done(out) => Some(out),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ItemState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Replace the settings. Any real change invalidates a finished result.
    fn change_settings(&mut self, settings: ConversionSettings) {
        if settings == self.settings {
            return;
        }
        self.settings = settings;
        self.revision += 1;
        if matches!(self.state, ItemState::Done(_) | ItemState::Error(_)) {
            debug!(id = %self.id, "settings changed, item needs reconversion");
            self.state = ItemState::Pending;
        }
    }
}

/// Result of [`Queue::add_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub accepted: Vec<ItemId>,
    /// Names of files the input filter turned away.
    pub rejected: Vec<String>,
}

/// Completed/total counts for a progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub converting: usize,
}

impl Progress {
    pub fn completed(&self) -> usize {
        self.done + self.failed
    }

    /// Fraction of items that reached a final state, `0.0` for an empty queue.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed() as f64 / self.total as f64
        }
    }
}

/// Everything a worker needs to convert one item without holding the lock.
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: ItemId,
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Arc<Vec<u8>>,
    pub settings: ConversionSettings,
    revision: u64,
}

#[derive(Debug)]
struct QueueState {
    items: Vec<QueueItem>,
    defaults: ConversionSettings,
    /// What `defaults` falls back to when the queue empties.
    saved_defaults: ConversionSettings,
    selection: Selection,
    next_id: u64,
}

#[derive(Debug)]
pub struct Queue {
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new(defaults: ConversionSettings) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: Vec::new(),
                saved_defaults: defaults.clone(),
                defaults,
                selection: Selection::Batch,
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue files that pass the input filter, each with a copy of the
    /// current defaults.
    pub fn add_files(&self, files: Vec<IncomingFile>) -> AddReport {
        let mut state = self.lock();
        let mut report = AddReport::default();
        for file in files {
            if !is_accepted(&file.name, file.mime.as_deref()) {
                warn!(name = %file.name, mime = ?file.mime, "rejected unsupported file");
                report.rejected.push(file.name);
                continue;
            }
            let id = ItemId(state.next_id);
            state.next_id += 1;
            let item = QueueItem {
                id,
                size: file.bytes.len() as u64,
                name: file.name,
                mime: file.mime,
                bytes: Arc::new(file.bytes),
                dimensions: None,
                settings: state.defaults.clone(),
                state: ItemState::Pending,
                revision: 0,
            };
            state.items.push(item);
            report.accepted.push(id);
        }
        report
    }

    /// Probe pixel dimensions of every item that has none yet, and seed its
    /// fixed-size settings from them.
    ///
    /// Headers are read outside the lock. Items that fail to identify are
    /// left alone; conversion will report the real error.
    pub fn populate_dimensions(&self, backend: &impl RasterBackend) {
        let unprobed: Vec<(ItemId, Arc<Vec<u8>>)> = self
            .lock()
            .items
            .iter()
            .filter(|item| item.dimensions.is_none())
            .map(|item| (item.id, Arc::clone(&item.bytes)))
            .collect();

        for (id, bytes) in unprobed {
            match backend.identify(&bytes) {
                Ok(dims) => self.set_dimensions(id, dims),
                Err(e) => debug!(%id, error = %e, "could not read dimensions"),
            }
        }
    }

    fn set_dimensions(&self, id: ItemId, dims: Dimensions) {
        let mut state = self.lock();
        let only_item = state.items.len() == 1;
        let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
            return;
        };
        item.dimensions = Some(dims);
        let mut seeded = item.settings.clone();
        seeded.seed_dimensions(dims.width, dims.height);
        item.change_settings(seeded);
        if only_item {
            state.defaults.seed_dimensions(dims.width, dims.height);
        }
    }

    pub fn remove(&self, id: ItemId) -> Option<QueueItem> {
        let mut state = self.lock();
        let index = state.items.iter().position(|item| item.id == id)?;
        let removed = state.items.remove(index);
        if let Selection::Items(ids) = &mut state.selection {
            ids.retain(|selected| *selected != id);
            if ids.is_empty() {
                state.selection = Selection::Batch;
            }
        }
        if state.items.is_empty() {
            state.defaults = state.saved_defaults.clone();
        }
        Some(removed)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.selection = Selection::Batch;
        state.defaults = state.saved_defaults.clone();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Snapshot of all items in enqueue order.
    pub fn items(&self) -> Vec<QueueItem> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: ItemId) -> Option<QueueItem> {
        self.lock().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn defaults(&self) -> ConversionSettings {
        self.lock().defaults.clone()
    }

    /// Replace the defaults the queue falls back to once it empties.
    pub fn set_saved_defaults(&self, saved: ConversionSettings) {
        self.lock().saved_defaults = saved;
    }

    pub fn selection(&self) -> Selection {
        self.lock().selection.clone()
    }

    /// Ids not present in the queue are dropped. An empty list means batch mode.
    pub fn set_selection(&self, selection: Selection) {
        let mut state = self.lock();
        state.selection = match selection {
            Selection::Items(ids) => {
                let ids: Vec<ItemId> = ids
                    .into_iter()
                    .filter(|id| state.items.iter().any(|item| item.id == *id))
                    .collect();
                if ids.is_empty() {
                    Selection::Batch
                } else {
                    Selection::Items(ids)
                }
            }
            Selection::Batch => Selection::Batch,
        };
    }

    /// The settings the panel should show and edit for the current selection.
    pub fn panel_settings(&self) -> ConversionSettings {
        let state = self.lock();
        match state
            .selection
            .primary()
            .and_then(|id| state.items.iter().find(|item| item.id == id))
        {
            Some(item) => effective_settings(&item.settings, &state.defaults, &state.selection),
            None => state.defaults.clone(),
        }
    }

    /// Apply a settings-panel edit.
    ///
    /// In batch mode the defaults change and every item is synced to them.
    /// With a selection only the selected items receive the patched fields.
    pub fn update_settings(&self, patch: &SettingsPatch) {
        if patch.is_empty() {
            return;
        }
        let mut state = self.lock();
        let state = &mut *state;
        match &state.selection {
            Selection::Batch => {
                patch.apply(&mut state.defaults);
                for item in &mut state.items {
                    item.change_settings(state.defaults.clone());
                }
            }
            Selection::Items(ids) => {
                for item in state.items.iter_mut().filter(|item| ids.contains(&item.id)) {
                    item.change_settings(patch.applied_to(&item.settings));
                }
            }
        }
    }

    /// Edit one item regardless of the selection. Returns `false` if the
    /// item does not exist.
    pub fn update_item_settings(&self, id: ItemId, patch: &SettingsPatch) -> bool {
        self.edit_item_settings(id, |settings| patch.apply(settings))
    }

    /// Edit one item's settings in place, with the same reset rules as a patch.
    pub fn edit_item_settings(
        &self,
        id: ItemId,
        edit: impl FnOnce(&mut ConversionSettings),
    ) -> bool {
        let mut state = self.lock();
        match state.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                let mut settings = item.settings.clone();
                edit(&mut settings);
                item.change_settings(settings);
                true
            }
            None => false,
        }
    }

    /// Ids currently pending, in enqueue order.
    pub fn pending_ids(&self) -> Vec<ItemId> {
        self.lock()
            .items
            .iter()
            .filter(|item| item.status() == ItemStatus::Pending)
            .map(|item| item.id)
            .collect()
    }

    /// Atomically move a pending item to converting.
    ///
    /// `None` if the item is gone or not pending, which is how concurrent
    /// runs avoid processing the same item twice.
    pub fn claim(&self, id: ItemId) -> Option<Claim> {
        let mut state = self.lock();
        let item = state.items.iter_mut().find(|item| item.id == id)?;
        if item.status() != ItemStatus::Pending {
            return None;
        }
        item.state = ItemState::Converting;
        Some(Claim {
            id,
            name: item.name.clone(),
            mime: item.mime.clone(),
            bytes: Arc::clone(&item.bytes),
            settings: item.settings.clone(),
            revision: item.revision,
        })
    }

    /// Record the outcome of a claimed conversion.
    ///
    /// Returns the status the item ended in, or `None` if it was removed
    /// meanwhile. A stale claim puts the item back to pending.
    pub fn finish(&self, claim: Claim, outcome: Result<Converted, String>) -> Option<ItemStatus> {
        let mut state = self.lock();
        let item = state.items.iter_mut().find(|item| item.id == claim.id)?;
        if item.revision != claim.revision {
            debug!(id = %item.id, "discarding result converted with stale settings");
            item.state = ItemState::Pending;
            return Some(ItemStatus::Pending);
        }
        item.state = match outcome {
            Ok(converted) => {
                if let Some(q) = converted.derived_quality {
                    item.settings.adopt_derived_quality(q);
                }
                ItemState::Done(Arc::new(converted))
            }
            Err(message) => ItemState::Error(message),
        };
        Some(item.status())
    }

    pub fn progress(&self) -> Progress {
        let state = self.lock();
        let mut progress = Progress {
            total: state.items.len(),
            ..Progress::default()
        };
        for item in &state.items {
            match item.status() {
                ItemStatus::Done => progress.done += 1,
                ItemStatus::Error => progress.failed += 1,
                ItemStatus::Converting => progress.converting += 1,
                ItemStatus::Pending => {}
            }
        }
        progress
    }

    /// Items in the done state, in enqueue order.
    pub fn completed(&self) -> Vec<QueueItem> {
        self.lock()
            .items
            .iter()
            .filter(|item| item.output().is_some())
            .cloned()
            .collect()
    }
}

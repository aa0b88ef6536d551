//! Ephemeral view-state cache.
//!
//! Tracks, per (item id, viewer id), which rendering mode the viewer is
//! currently shown and which message handle displays it. Purely advisory:
//! losing an entry degrades UX (wrong toggle state) but never corrupts
//! stored data. Injectable so tests construct an isolated instance.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::RenderMode;

/// What one viewer currently sees for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub mode: RenderMode,
    /// Handle of the message currently displaying the item.
    pub message_id: i64,
}

impl ViewState {
    pub fn new(mode: RenderMode, message_id: i64) -> Self {
        Self { mode, message_id }
    }
}

type Key = (i64, i64);

#[derive(Debug, Default)]
struct Maps {
    messages: HashMap<Key, ViewState>,
    media_groups: HashMap<Key, ViewState>,
}

/// Process-local cache behind a single mutex. Every operation is a plain map
/// read or write; the lock is never held across I/O.
#[derive(Debug, Default)]
pub struct ViewStateCache {
    maps: Mutex<Maps>,
}

impl ViewStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: i64, viewer_id: i64) -> Option<ViewState> {
        self.lock().messages.get(&(item_id, viewer_id)).copied()
    }

    pub fn set(&self, item_id: i64, viewer_id: i64, state: ViewState) {
        self.lock().messages.insert((item_id, viewer_id), state);
    }

    /// Idempotent: removing an absent key is fine.
    pub fn remove(&self, item_id: i64, viewer_id: i64) {
        self.lock().messages.remove(&(item_id, viewer_id));
    }

    pub fn get_media_group(&self, item_id: i64, viewer_id: i64) -> Option<ViewState> {
        self.lock().media_groups.get(&(item_id, viewer_id)).copied()
    }

    pub fn set_media_group(&self, item_id: i64, viewer_id: i64, state: ViewState) {
        self.lock().media_groups.insert((item_id, viewer_id), state);
    }

    pub fn remove_media_group(&self, item_id: i64, viewer_id: i64) {
        self.lock().media_groups.remove(&(item_id, viewer_id));
    }

    /// Drops every viewer's entries for an item whose workflow terminated.
    pub fn remove_item(&self, item_id: i64) {
        let mut maps = self.lock();
        maps.messages.retain(|(id, _), _| *id != item_id);
        maps.media_groups.retain(|(id, _), _| *id != item_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Maps> {
        // A poisoned lock means a panic mid map-op; the maps are still
        // structurally sound, so keep serving.
        self.maps.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

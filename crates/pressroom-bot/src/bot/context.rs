use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use pressroom_core::digest::DigestAggregator;
use pressroom_core::model::RenderMode;
use pressroom_core::workflow::WorkflowEngine;

use crate::rewrite::HttpRewriter;
use crate::store::JsonStore;
use crate::telegram::TelegramClient;

pub(crate) type Engine = WorkflowEngine<JsonStore, HttpRewriter, TelegramClient>;
pub(crate) type Aggregator = DigestAggregator<JsonStore, HttpRewriter>;

/// Shared state handed to every update task.
///
/// Digest displays are tracked here rather than in the core view-state cache
/// because they are addressed by fingerprint, not item id: the rendering
/// mode per (fingerprint, viewer), and the per-viewer pending digest edit.
pub(crate) struct BotContext {
    client: TelegramClient,
    engine: Engine,
    aggregator: Aggregator,
    store: JsonStore,
    operator_ids: HashSet<i64>,
    channel_id: i64,
    digest_modes: Mutex<HashMap<(String, i64), RenderMode>>,
    pending_digest_edits: Mutex<HashMap<i64, String>>,
}

impl BotContext {
    pub(crate) fn new(
        client: TelegramClient,
        engine: Engine,
        aggregator: Aggregator,
        store: JsonStore,
        operator_ids: HashSet<i64>,
        channel_id: i64,
    ) -> Self {
        Self {
            client,
            engine,
            aggregator,
            store,
            operator_ids,
            channel_id,
            digest_modes: Mutex::new(HashMap::new()),
            pending_digest_edits: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn client(&self) -> &TelegramClient {
        &self.client
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub(crate) fn store(&self) -> &JsonStore {
        &self.store
    }

    pub(crate) fn operator_ids(&self) -> &HashSet<i64> {
        &self.operator_ids
    }

    pub(crate) fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// Rendering mode of a digest display; digests start plain since the
    /// generated text carries no markup.
    pub(crate) fn digest_mode(&self, fingerprint: &str, viewer_id: i64) -> RenderMode {
        self.lock_modes()
            .get(&(fingerprint.to_string(), viewer_id))
            .copied()
            .unwrap_or(RenderMode::Plain)
    }

    pub(crate) fn set_digest_mode(&self, fingerprint: &str, viewer_id: i64, mode: RenderMode) {
        self.lock_modes()
            .insert((fingerprint.to_string(), viewer_id), mode);
    }

    pub(crate) fn set_pending_digest_edit(&self, viewer_id: i64, fingerprint: String) {
        self.lock_pending().insert(viewer_id, fingerprint);
    }

    pub(crate) fn pending_digest_edit(&self, viewer_id: i64) -> Option<String> {
        self.lock_pending().get(&viewer_id).cloned()
    }

    pub(crate) fn take_pending_digest_edit(&self, viewer_id: i64) -> Option<String> {
        self.lock_pending().remove(&viewer_id)
    }

    fn lock_modes(&self) -> std::sync::MutexGuard<'_, HashMap<(String, i64), RenderMode>> {
        self.digest_modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<i64, String>> {
        self.pending_digest_edits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

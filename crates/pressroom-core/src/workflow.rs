//! Per-item editorial workflow engine.
//!
//! Drives one content item from ingestion through publication:
//! `Ingested -> {AiGenerated, Edited} -> Previewing -> Published`, with
//! cancellation returning to the settled stage. The markup on/off toggle is
//! an orthogonal sub-state held in the view-state cache; it never changes
//! which text variant is canonical.
//!
//! Every operation checks the operator allowlist before touching anything,
//! and transitions for one item are linearized through a per-item lock so a
//! concurrent edit and toggle cannot interleave.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::markup::escape_text;
use crate::model::{ContentItem, RenderMode, Stage, TextVariant};
use crate::rewrite::{RewriteFailure, Rewriter};
use crate::sink::{ActionRows, OutboundSink, SinkError};
use crate::store::Store;
use crate::viewstate::{ViewState, ViewStateCache};

/// A reported workflow failure. Scoped to the invocation that triggered it;
/// nothing here is process-fatal.
#[derive(Debug)]
pub enum WorkflowError {
    /// Invoker is not in the operator allowlist. Nothing was mutated.
    AccessDenied,
    /// The addressed item or digest does not exist.
    NotFound,
    /// The operation needs text the item does not have.
    EmptyText,
    /// `apply_edit` without a preceding `request_edit`.
    NoPendingEdit,
    /// Confirm/cancel without a pending preview.
    NotPreviewing,
    /// The rewrite collaborator reported a failure; retry is caller-initiated.
    Rewrite(RewriteFailure),
    /// The outbound sink failed for a reason other than the classified
    /// no-op/markup cases.
    Sink(SinkError),
    Store(anyhow::Error),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::AccessDenied => write!(f, "access denied"),
            WorkflowError::NotFound => write!(f, "record not found"),
            WorkflowError::EmptyText => write!(f, "no text for this operation"),
            WorkflowError::NoPendingEdit => write!(f, "no edit in progress"),
            WorkflowError::NotPreviewing => write!(f, "no pending preview"),
            WorkflowError::Rewrite(failure) => write!(f, "rewrite failed: {failure}"),
            WorkflowError::Sink(err) => write!(f, "sink failed: {err}"),
            WorkflowError::Store(err) => write!(f, "store failed: {err}"),
        }
    }
}

impl std::error::Error for WorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkflowError::Rewrite(failure) => Some(failure),
            WorkflowError::Sink(err) => Some(err),
            WorkflowError::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        WorkflowError::Store(err)
    }
}

/// Captured edit sub-state for one viewer: which item and which variant the
/// edit started from. Persists until cancelled or superseded by a new edit
/// request from the same viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEdit {
    pub item_id: i64,
    pub source: TextVariant,
}

/// Result of flagging an item for the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestFlag {
    Added,
    AlreadyIncluded,
}

pub struct WorkflowEngine<S, R, K> {
    store: S,
    rewriter: R,
    sink: K,
    operators: HashSet<i64>,
    /// Channel the confirmed publish lands in.
    publish_target: i64,
    viewstate: Arc<ViewStateCache>,
    pending_edits: StdMutex<HashMap<i64, PendingEdit>>,
    item_locks: StdMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl<S, R, K> WorkflowEngine<S, R, K>
where
    S: Store,
    R: Rewriter,
    K: OutboundSink,
{
    pub fn new(
        store: S,
        rewriter: R,
        sink: K,
        operators: HashSet<i64>,
        publish_target: i64,
        viewstate: Arc<ViewStateCache>,
    ) -> Self {
        Self {
            store,
            rewriter,
            sink,
            operators,
            publish_target,
            viewstate,
            pending_edits: StdMutex::new(HashMap::new()),
            item_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn viewstate(&self) -> &ViewStateCache {
        &self.viewstate
    }

    pub fn is_operator(&self, viewer_id: i64) -> bool {
        self.operators.contains(&viewer_id)
    }

    /// Rewrites the item's raw text through the AI collaborator and stores
    /// the result as the AI variant. On collaborator failure the item is
    /// untouched and the failure is reported for retry.
    pub async fn generate_variant(
        &self,
        item_id: i64,
        viewer_id: i64,
    ) -> Result<ContentItem, WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let mut item = self.load_item(item_id).await?;
        if item.text.is_empty() {
            return Err(WorkflowError::EmptyText);
        }

        let ai_text = self
            .rewriter
            .rewrite(&item.text)
            .await
            .map_err(WorkflowError::Rewrite)?;

        item.ai_text = Some(ai_text);
        item.stage = Stage::AiGenerated;
        self.store.save_item(&item).await?;
        info!(item_id, viewer_id, "AI variant generated");
        Ok(item)
    }

    /// Starts edit capture for one viewer from the given variant. Returns
    /// the text to present for editing. A new request from the same viewer
    /// supersedes any earlier capture.
    pub async fn request_edit(
        &self,
        item_id: i64,
        viewer_id: i64,
        source: TextVariant,
    ) -> Result<String, WorkflowError> {
        self.authorize(viewer_id)?;
        let item = self.load_item(item_id).await?;
        let text = item.variant_text(source);
        if text.is_empty() {
            return Err(WorkflowError::EmptyText);
        }
        self.lock_pending()
            .insert(viewer_id, PendingEdit { item_id, source });
        Ok(text.to_string())
    }

    /// The viewer's in-progress edit capture, if any.
    pub fn pending_edit(&self, viewer_id: i64) -> Option<PendingEdit> {
        self.lock_pending().get(&viewer_id).copied()
    }

    /// Discards the viewer's edit capture without mutation. Returns whether
    /// a capture existed.
    pub fn cancel_edit(&self, viewer_id: i64) -> bool {
        self.lock_pending().remove(&viewer_id).is_some()
    }

    /// Stores the captured text as the edited variant. The edited variant
    /// supersedes raw and AI for display and publish regardless of which
    /// variant the edit started from.
    pub async fn apply_edit(
        &self,
        viewer_id: i64,
        new_text: &str,
    ) -> Result<ContentItem, WorkflowError> {
        self.authorize(viewer_id)?;
        let pending = self
            .lock_pending()
            .get(&viewer_id)
            .copied()
            .ok_or(WorkflowError::NoPendingEdit)?;
        let _guard = self.item_guard(pending.item_id).await;

        let mut item = self.load_item(pending.item_id).await?;
        item.edited_text = Some(new_text.to_string());
        item.stage = Stage::Edited;
        self.store.save_item(&item).await?;
        self.lock_pending().remove(&viewer_id);
        info!(item_id = pending.item_id, viewer_id, "manual edit applied");
        Ok(item)
    }

    /// Flips the viewer's rendering mode for this item and re-renders the
    /// displayed message with the given variant under the new mode.
    ///
    /// An "unchanged" sink failure is a no-op success. A markup rejection
    /// degrades this one render to escaped plain text; the stored mode still
    /// flips.
    pub async fn toggle_markup(
        &self,
        item_id: i64,
        viewer_id: i64,
        variant: TextVariant,
        displayed_message_id: i64,
        actions: &ActionRows,
    ) -> Result<RenderMode, WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let item = self.load_item(item_id).await?;
        let current = self
            .viewstate
            .get(item_id, viewer_id)
            .map_or(RenderMode::Marked, |state| state.mode);
        let new_mode = current.toggled();
        let message_id = self
            .viewstate
            .get(item_id, viewer_id)
            .map_or(displayed_message_id, |state| state.message_id);
        let text = item.variant_text(variant).to_string();

        let result = self
            .render_edit(&item, viewer_id, message_id, &text, new_mode, Some(actions))
            .await;
        match result {
            Ok(()) => {}
            Err(SinkError::Unchanged) => {
                debug!(item_id, viewer_id, "toggle left content unchanged");
            }
            Err(SinkError::MarkupRejected) => {
                warn!(item_id, viewer_id, "markup rejected, degrading one render");
                self.render_edit(
                    &item,
                    viewer_id,
                    message_id,
                    &escape_text(&text),
                    RenderMode::Plain,
                    Some(actions),
                )
                .await
                .map_err(WorkflowError::Sink)?;
            }
            Err(err) => return Err(WorkflowError::Sink(err)),
        }

        self.viewstate
            .set(item_id, viewer_id, ViewState::new(new_mode, message_id));
        Ok(new_mode)
    }

    /// Sends a preview of the chosen variant to the viewer and parks the
    /// item in the previewing stage awaiting explicit confirmation.
    pub async fn request_publish(
        &self,
        item_id: i64,
        viewer_id: i64,
        variant: TextVariant,
    ) -> Result<(), WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let mut item = self.load_item(item_id).await?;
        let text = item.variant_text(variant).to_string();
        if text.is_empty() && item.media_handle.is_none() {
            return Err(WorkflowError::EmptyText);
        }

        self.render_send(&item, viewer_id, &text).await?;
        item.stage = Stage::Previewing { variant };
        self.store.save_item(&item).await?;
        Ok(())
    }

    /// Publishes the previewed variant to the configured channel and moves
    /// the item to the terminal published stage.
    pub async fn confirm_publish(&self, item_id: i64, viewer_id: i64) -> Result<(), WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let mut item = self.load_item(item_id).await?;
        let Stage::Previewing { variant } = item.stage else {
            return Err(WorkflowError::NotPreviewing);
        };
        let text = item.variant_text(variant).to_string();

        self.render_send(&item, self.publish_target, &text).await?;
        item.stage = Stage::Published;
        self.store.save_item(&item).await?;

        // Published is terminal: the displays and the transition lock for
        // this item are no longer needed.
        self.viewstate.remove_item(item_id);
        self.discard_item_lock(item_id);
        info!(item_id, viewer_id, "item published");
        Ok(())
    }

    /// Abandons a pending preview; the item returns to the stage implied by
    /// its variants, with no other mutation.
    pub async fn cancel_publish(
        &self,
        item_id: i64,
        viewer_id: i64,
    ) -> Result<Stage, WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let mut item = self.load_item(item_id).await?;
        if !item.stage.is_previewing() {
            return Err(WorkflowError::NotPreviewing);
        }
        item.stage = item.settled_stage();
        self.store.save_item(&item).await?;
        Ok(item.stage)
    }

    /// Flags the item for digest aggregation, stamping its processing time.
    /// Flagging an already-flagged item is an informational no-op.
    pub async fn set_in_digest(
        &self,
        item_id: i64,
        viewer_id: i64,
    ) -> Result<DigestFlag, WorkflowError> {
        self.authorize(viewer_id)?;
        let _guard = self.item_guard(item_id).await;

        let mut item = self.load_item(item_id).await?;
        if item.in_digest {
            return Ok(DigestFlag::AlreadyIncluded);
        }
        item.in_digest = true;
        item.processed_at = Some(Utc::now());
        self.store.save_item(&item).await?;
        info!(item_id, viewer_id, "item flagged for digest");
        Ok(DigestFlag::Added)
    }

    fn authorize(&self, viewer_id: i64) -> Result<(), WorkflowError> {
        if self.operators.contains(&viewer_id) {
            Ok(())
        } else {
            warn!(viewer_id, "unauthorized workflow invocation rejected");
            Err(WorkflowError::AccessDenied)
        }
    }

    async fn load_item(&self, item_id: i64) -> Result<ContentItem, WorkflowError> {
        self.store
            .item_by_id(item_id)
            .await?
            .ok_or(WorkflowError::NotFound)
    }

    /// Edits the viewer-facing display message: text body for text items,
    /// caption for media items. The display message lives in the viewer's
    /// direct chat, whose id equals the viewer id.
    async fn render_edit(
        &self,
        item: &ContentItem,
        viewer_id: i64,
        message_id: i64,
        text: &str,
        mode: RenderMode,
        actions: Option<&ActionRows>,
    ) -> Result<(), SinkError> {
        if item.kind.is_text() {
            self.sink
                .edit_text(viewer_id, message_id, text, mode, actions)
                .await
        } else {
            self.sink
                .edit_caption(viewer_id, message_id, text, mode, actions)
                .await
        }
    }

    /// Sends the item toward `target` with markup on, degrading this single
    /// render to escaped plain text if the sink rejects the markup.
    async fn render_send(
        &self,
        item: &ContentItem,
        target: i64,
        text: &str,
    ) -> Result<i64, WorkflowError> {
        let first = self.send_once(item, target, text, RenderMode::Marked).await;
        match first {
            Ok(handle) => Ok(handle),
            Err(SinkError::MarkupRejected) => {
                warn!(item_id = item.id, "markup rejected, sending escaped plain text");
                self.send_once(item, target, &escape_text(text), RenderMode::Plain)
                    .await
                    .map_err(WorkflowError::Sink)
            }
            Err(err) => Err(WorkflowError::Sink(err)),
        }
    }

    async fn send_once(
        &self,
        item: &ContentItem,
        target: i64,
        text: &str,
        mode: RenderMode,
    ) -> Result<i64, SinkError> {
        match item.media_handle.as_deref() {
            Some(handle) if !item.kind.is_text() => {
                self.sink
                    .send_media(target, item.kind, handle, text, mode, None)
                    .await
            }
            _ => self.sink.send_text(target, text, mode, None).await,
        }
    }

    /// At most one in-flight transition per item id.
    async fn item_guard(&self, item_id: i64) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .item_locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(locks.entry(item_id).or_default())
        };
        lock.lock_owned().await
    }

    /// The guard taken by the current transition keeps the mutex alive via
    /// its `Arc`; later callers for the same id get a fresh entry.
    fn discard_item_lock(&self, item_id: i64) {
        self.item_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&item_id);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<i64, PendingEdit>> {
        self.pending_edits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentKind;
    use crate::rewrite::RewriteFailure;
    use crate::store::{ItemDraft, MemoryStore};
    use std::sync::Mutex;

    struct OkRewriter(&'static str);

    impl Rewriter for OkRewriter {
        async fn rewrite(&self, _text: &str) -> Result<String, RewriteFailure> {
            Ok(self.0.to_string())
        }

        async fn rewrite_batch(&self, _texts: &[String]) -> Result<String, RewriteFailure> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRewriter;

    impl Rewriter for FailingRewriter {
        async fn rewrite(&self, _text: &str) -> Result<String, RewriteFailure> {
            Err(RewriteFailure::new("model unavailable"))
        }

        async fn rewrite_batch(&self, _texts: &[String]) -> Result<String, RewriteFailure> {
            Err(RewriteFailure::new("model unavailable"))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct SentMessage {
        target: i64,
        text: String,
        mode: RenderMode,
        edit: bool,
    }

    /// Sink double: records every render and pops scripted failures.
    #[derive(Default)]
    struct ScriptedSink {
        sent: Mutex<Vec<SentMessage>>,
        failures: Mutex<Vec<SinkError>>,
    }

    impl ScriptedSink {
        fn fail_next(&self, err: SinkError) {
            self.failures.lock().unwrap().push(err);
        }

        fn take_sent(&self) -> Vec<SentMessage> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }

        fn record(&self, target: i64, text: &str, mode: RenderMode, edit: bool) -> Result<(), SinkError> {
            if let Some(err) = self.failures.lock().unwrap().pop() {
                return Err(err);
            }
            self.sent.lock().unwrap().push(SentMessage {
                target,
                text: text.to_string(),
                mode,
                edit,
            });
            Ok(())
        }
    }

    impl OutboundSink for ScriptedSink {
        async fn send_text(
            &self,
            target: i64,
            text: &str,
            mode: RenderMode,
            _actions: Option<&ActionRows>,
        ) -> Result<i64, SinkError> {
            self.record(target, text, mode, false)?;
            Ok(1000)
        }

        async fn send_media(
            &self,
            target: i64,
            _kind: ContentKind,
            _media_handle: &str,
            caption: &str,
            mode: RenderMode,
            _actions: Option<&ActionRows>,
        ) -> Result<i64, SinkError> {
            self.record(target, caption, mode, false)?;
            Ok(1001)
        }

        async fn edit_text(
            &self,
            target: i64,
            _message_id: i64,
            text: &str,
            mode: RenderMode,
            _actions: Option<&ActionRows>,
        ) -> Result<(), SinkError> {
            self.record(target, text, mode, true)
        }

        async fn edit_caption(
            &self,
            target: i64,
            _message_id: i64,
            caption: &str,
            mode: RenderMode,
            _actions: Option<&ActionRows>,
        ) -> Result<(), SinkError> {
            self.record(target, caption, mode, true)
        }
    }

    const OPERATOR: i64 = 7;
    const OUTSIDER: i64 = 8;
    const CHANNEL: i64 = -100500;

    fn engine_with<R: Rewriter>(rewriter: R) -> WorkflowEngine<MemoryStore, R, ScriptedSink> {
        WorkflowEngine::new(
            MemoryStore::new(),
            rewriter,
            ScriptedSink::default(),
            HashSet::from([OPERATOR]),
            CHANNEL,
            Arc::new(ViewStateCache::new()),
        )
    }

    async fn seed_item<R: Rewriter>(
        engine: &WorkflowEngine<MemoryStore, R, ScriptedSink>,
        text: &str,
    ) -> ContentItem {
        engine
            .store
            .upsert_item(ItemDraft {
                chat_id: -1,
                chat_title: "News".to_string(),
                message_id: 5,
                kind: ContentKind::Text,
                text: text.to_string(),
                media_handle: None,
                original_date: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_viewer_is_rejected_without_mutation() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        let err = engine.generate_variant(item.id, OUTSIDER).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AccessDenied));

        let reloaded = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert!(reloaded.ai_text.is_none());
        assert_eq!(reloaded.stage, Stage::Ingested);
    }

    #[tokio::test]
    async fn test_generate_variant_stores_ai_text() {
        let engine = engine_with(OkRewriter("rewritten"));
        let item = seed_item(&engine, "raw").await;

        let updated = engine.generate_variant(item.id, OPERATOR).await.unwrap();
        assert_eq!(updated.ai_text.as_deref(), Some("rewritten"));
        assert_eq!(updated.stage, Stage::AiGenerated);
    }

    #[tokio::test]
    async fn test_generate_variant_failure_leaves_item_ingested() {
        let engine = engine_with(FailingRewriter);
        let item = seed_item(&engine, "raw").await;

        let err = engine.generate_variant(item.id, OPERATOR).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Rewrite(ref f) if f.message == "model unavailable"));

        let reloaded = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stage, Stage::Ingested);
    }

    #[tokio::test]
    async fn test_edit_capture_lifecycle() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        let shown = engine
            .request_edit(item.id, OPERATOR, TextVariant::Raw)
            .await
            .unwrap();
        assert_eq!(shown, "raw");
        assert!(engine.pending_edit(OPERATOR).is_some());

        let updated = engine.apply_edit(OPERATOR, "edited").await.unwrap();
        assert_eq!(updated.edited_text.as_deref(), Some("edited"));
        assert_eq!(updated.stage, Stage::Edited);
        assert!(engine.pending_edit(OPERATOR).is_none());
    }

    #[tokio::test]
    async fn test_cancel_edit_discards_capture_without_mutation() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        engine
            .request_edit(item.id, OPERATOR, TextVariant::Raw)
            .await
            .unwrap();
        assert!(engine.cancel_edit(OPERATOR));
        assert!(!engine.cancel_edit(OPERATOR));

        let err = engine.apply_edit(OPERATOR, "x").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoPendingEdit));
        let reloaded = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert!(reloaded.edited_text.is_none());
    }

    #[tokio::test]
    async fn test_edit_from_ai_variant_still_lands_in_edited_stage() {
        let engine = engine_with(OkRewriter("ai text"));
        let item = seed_item(&engine, "raw").await;
        engine.generate_variant(item.id, OPERATOR).await.unwrap();

        engine
            .request_edit(item.id, OPERATOR, TextVariant::Ai)
            .await
            .unwrap();
        let updated = engine.apply_edit(OPERATOR, "edited ai").await.unwrap();
        assert_eq!(updated.stage, Stage::Edited);
        assert_eq!(updated.canonical_variant(), TextVariant::Edited);
    }

    #[tokio::test]
    async fn test_toggle_markup_flips_mode_and_back() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;
        let actions = vec![];

        let mode = engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Raw, 42, &actions)
            .await
            .unwrap();
        assert_eq!(mode, RenderMode::Plain);

        let mode = engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Raw, 42, &actions)
            .await
            .unwrap();
        assert_eq!(mode, RenderMode::Marked);
    }

    #[tokio::test]
    async fn test_toggle_preserves_edited_variant_across_round_trip() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;
        engine
            .request_edit(item.id, OPERATOR, TextVariant::Raw)
            .await
            .unwrap();
        engine.apply_edit(OPERATOR, "edited").await.unwrap();

        let actions = vec![];
        engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Edited, 42, &actions)
            .await
            .unwrap();
        engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Edited, 42, &actions)
            .await
            .unwrap();

        let sent = engine.sink.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|msg| msg.text == "edited" && msg.edit));
        assert_eq!(sent[0].mode, RenderMode::Plain);
        assert_eq!(sent[1].mode, RenderMode::Marked);

        let reloaded = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(reloaded.edited_text.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn test_toggle_treats_unchanged_as_noop_success() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;
        engine.sink.fail_next(SinkError::Unchanged);

        let actions = vec![];
        let mode = engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Raw, 42, &actions)
            .await
            .unwrap();
        assert_eq!(mode, RenderMode::Plain);
        assert_eq!(
            engine.viewstate.get(item.id, OPERATOR).unwrap().mode,
            RenderMode::Plain
        );
    }

    #[tokio::test]
    async fn test_toggle_markup_rejection_degrades_single_render_only() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "<b>raw</b>").await;
        // Start from Plain so the toggle goes to Marked and can be rejected.
        engine
            .viewstate
            .set(item.id, OPERATOR, ViewState::new(RenderMode::Plain, 42));
        engine.sink.fail_next(SinkError::MarkupRejected);

        let actions = vec![];
        let mode = engine
            .toggle_markup(item.id, OPERATOR, TextVariant::Raw, 42, &actions)
            .await
            .unwrap();

        // Stored mode still flips; only the one displayed render degraded.
        assert_eq!(mode, RenderMode::Marked);
        assert_eq!(
            engine.viewstate.get(item.id, OPERATOR).unwrap().mode,
            RenderMode::Marked
        );
        let sent = engine.sink.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mode, RenderMode::Plain);
        assert_eq!(sent[0].text, "&lt;b&gt;raw&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_publish_requires_confirmation() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        engine
            .request_publish(item.id, OPERATOR, TextVariant::Raw)
            .await
            .unwrap();
        let previewing = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(
            previewing.stage,
            Stage::Previewing {
                variant: TextVariant::Raw
            }
        );

        engine.confirm_publish(item.id, OPERATOR).await.unwrap();
        let published = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(published.stage, Stage::Published);

        let sent = engine.sink.take_sent();
        assert_eq!(sent.len(), 2);
        // Preview goes to the viewer's chat, the publish to the channel.
        assert_eq!(sent[1].target, CHANNEL);
    }

    #[tokio::test]
    async fn test_publish_clears_view_state_and_transition_lock() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;
        engine
            .viewstate
            .set(item.id, OPERATOR, ViewState::new(RenderMode::Marked, 31));

        engine
            .request_publish(item.id, OPERATOR, TextVariant::Raw)
            .await
            .unwrap();
        assert!(engine.viewstate.get(item.id, OPERATOR).is_some());

        engine.confirm_publish(item.id, OPERATOR).await.unwrap();
        assert!(engine.viewstate.get(item.id, OPERATOR).is_none());
        let locks = engine
            .item_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(!locks.contains_key(&item.id));
    }

    #[tokio::test]
    async fn test_confirm_without_preview_is_a_reported_precondition_failure() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        let err = engine.confirm_publish(item.id, OPERATOR).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotPreviewing));
        let reloaded = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stage, Stage::Ingested);
    }

    #[tokio::test]
    async fn test_cancel_publish_restores_settled_stage() {
        let engine = engine_with(OkRewriter("ai gen"));
        let item = seed_item(&engine, "raw").await;
        engine.generate_variant(item.id, OPERATOR).await.unwrap();
        engine
            .request_publish(item.id, OPERATOR, TextVariant::Ai)
            .await
            .unwrap();

        let stage = engine.cancel_publish(item.id, OPERATOR).await.unwrap();
        assert_eq!(stage, Stage::AiGenerated);
    }

    #[tokio::test]
    async fn test_set_in_digest_is_idempotent_and_stamps_processed_at() {
        let engine = engine_with(OkRewriter("ai"));
        let item = seed_item(&engine, "raw").await;

        assert_eq!(
            engine.set_in_digest(item.id, OPERATOR).await.unwrap(),
            DigestFlag::Added
        );
        let flagged = engine.store.item_by_id(item.id).await.unwrap().unwrap();
        assert!(flagged.in_digest);
        assert!(flagged.processed_at.is_some());

        assert_eq!(
            engine.set_in_digest(item.id, OPERATOR).await.unwrap(),
            DigestFlag::AlreadyIncluded
        );
    }

    #[tokio::test]
    async fn test_missing_item_is_reported_not_fatal() {
        let engine = engine_with(OkRewriter("ai"));
        let err = engine.generate_variant(404, OPERATOR).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));
    }
}

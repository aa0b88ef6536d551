//! Persistent record store contract.
//!
//! The store is the single source of truth for items and digests; the core
//! holds only transient copies during a workflow step. Conflicting writes to
//! the same record serialize at the storage layer.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{ContentItem, ContentKind, DigestBatch, Stage};

/// Fields of a freshly ingested message, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub chat_id: i64,
    pub chat_title: String,
    pub message_id: i64,
    pub kind: ContentKind,
    pub text: String,
    pub media_handle: Option<String>,
    pub original_date: DateTime<Utc>,
}

/// Narrow CRUD contract over the key-indexed record store.
pub trait Store: Send + Sync {
    fn item_by_id(&self, id: i64) -> impl Future<Output = Result<Option<ContentItem>>> + Send;

    /// Upserts by the natural key (chat id, message id). Re-ingesting the
    /// same message refreshes text, media handle and receive time in place.
    fn upsert_item(&self, draft: ItemDraft) -> impl Future<Output = Result<ContentItem>> + Send;

    /// Writes back an item mutated during a workflow step.
    fn save_item(&self, item: &ContentItem) -> impl Future<Output = Result<()>> + Send;

    /// Digest-flagged items received at or after `since`, newest first.
    fn list_digest_items(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ContentItem>>> + Send;

    fn digest_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> impl Future<Output = Result<Option<DigestBatch>>> + Send;

    /// Upserts by fingerprint: an existing batch gets its text and member
    /// set replaced in place, never duplicated.
    fn upsert_digest(
        &self,
        fingerprint: &str,
        text: &str,
        member_ids: &[i64],
    ) -> impl Future<Output = Result<DigestBatch>> + Send;

    /// Returns false when no digest carries the fingerprint.
    fn set_digest_edited_text(
        &self,
        fingerprint: &str,
        edited_text: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Returns false when no digest carries the fingerprint.
    fn mark_digest_published(
        &self,
        fingerprint: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<i64, ContentItem>,
    digests: HashMap<String, DigestBatch>,
    next_id: i64,
}

/// In-memory store. Backs tests and doubles as the reference semantics for
/// file-backed implementations.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    async fn item_by_id(&self, id: i64) -> Result<Option<ContentItem>> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn upsert_item(&self, draft: ItemDraft) -> Result<ContentItem> {
        let mut state = self.lock();
        if let Some(item) = state
            .items
            .values_mut()
            .find(|item| item.chat_id == draft.chat_id && item.message_id == draft.message_id)
        {
            item.text = draft.text;
            item.media_handle = draft.media_handle;
            item.received_at = Utc::now();
            return Ok(item.clone());
        }

        state.next_id += 1;
        let item = ContentItem {
            id: state.next_id,
            chat_id: draft.chat_id,
            chat_title: draft.chat_title,
            message_id: draft.message_id,
            kind: draft.kind,
            text: draft.text,
            ai_text: None,
            edited_text: None,
            media_handle: draft.media_handle,
            in_digest: false,
            stage: Stage::Ingested,
            original_date: draft.original_date,
            received_at: Utc::now(),
            processed_at: None,
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn save_item(&self, item: &ContentItem) -> Result<()> {
        self.lock().items.insert(item.id, item.clone());
        Ok(())
    }

    async fn list_digest_items(&self, since: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> = self
            .lock()
            .items
            .values()
            .filter(|item| item.in_digest && item.received_at >= since)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(items)
    }

    async fn digest_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DigestBatch>> {
        Ok(self.lock().digests.get(fingerprint).cloned())
    }

    async fn upsert_digest(
        &self,
        fingerprint: &str,
        text: &str,
        member_ids: &[i64],
    ) -> Result<DigestBatch> {
        let mut state = self.lock();
        let batch = match state.digests.get_mut(fingerprint) {
            Some(batch) => {
                batch.text = text.to_string();
                batch.member_ids = member_ids.to_vec();
                batch.clone()
            }
            None => {
                let batch = DigestBatch {
                    fingerprint: fingerprint.to_string(),
                    text: text.to_string(),
                    edited_text: None,
                    member_ids: member_ids.to_vec(),
                    created_at: Utc::now(),
                    published_at: None,
                };
                state.digests.insert(fingerprint.to_string(), batch.clone());
                batch
            }
        };
        Ok(batch)
    }

    async fn set_digest_edited_text(&self, fingerprint: &str, edited_text: &str) -> Result<bool> {
        let mut state = self.lock();
        match state.digests.get_mut(fingerprint) {
            Some(batch) => {
                batch.edited_text = Some(edited_text.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_digest_published(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.digests.get_mut(fingerprint) {
            Some(batch) => {
                batch.published_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(chat_id: i64, message_id: i64, text: &str) -> ItemDraft {
        ItemDraft {
            chat_id,
            chat_title: "News".to_string(),
            message_id,
            kind: ContentKind::Text,
            text: text.to_string(),
            media_handle: None,
            original_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_item_assigns_ids_and_reuses_natural_key() {
        let store = MemoryStore::new();
        let first = store.upsert_item(draft(1, 10, "one")).await.unwrap();
        let second = store.upsert_item(draft(1, 11, "two")).await.unwrap();
        assert_ne!(first.id, second.id);

        let updated = store.upsert_item(draft(1, 10, "one v2")).await.unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.text, "one v2");
    }

    #[tokio::test]
    async fn test_list_digest_items_filters_flag_and_window() {
        let store = MemoryStore::new();
        let mut flagged = store.upsert_item(draft(1, 1, "in")).await.unwrap();
        flagged.in_digest = true;
        store.save_item(&flagged).await.unwrap();

        let mut stale = store.upsert_item(draft(1, 2, "old")).await.unwrap();
        stale.in_digest = true;
        stale.received_at = Utc::now() - chrono::Duration::hours(48);
        store.save_item(&stale).await.unwrap();

        store.upsert_item(draft(1, 3, "unflagged")).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(24);
        let items = store.list_digest_items(since).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "in");
    }

    #[tokio::test]
    async fn test_upsert_digest_updates_in_place() {
        let store = MemoryStore::new();
        let first = store.upsert_digest("abcd1234", "text", &[1, 2]).await.unwrap();
        let second = store.upsert_digest("abcd1234", "text v2", &[3]).await.unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.text, "text v2");
        assert_eq!(second.member_ids, vec![3]);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_digest_mutations_report_missing_fingerprint() {
        let store = MemoryStore::new();
        assert!(!store.set_digest_edited_text("none", "x").await.unwrap());
        assert!(!store.mark_digest_published("none", Utc::now()).await.unwrap());
    }
}

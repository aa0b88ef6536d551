//! JSON-file record store.
//!
//! The whole record set lives in one JSON document under the pressroom home
//! directory. Every mutation rewrites the file while holding the store lock,
//! so conflicting writes serialize here and the file always reflects the
//! last completed operation. The scale is a single editorial team's feed;
//! linear scans are fine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use pressroom_core::model::{ContentItem, DigestBatch, Stage};
use pressroom_core::store::{ItemDraft, Store};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordFile {
    items: Vec<ContentItem>,
    digests: Vec<DigestBatch>,
    next_id: i64,
}

/// File-backed store. Clones share the same file and lock.
#[derive(Clone)]
pub struct JsonStore {
    path: Arc<PathBuf>,
    state: Arc<Mutex<RecordFile>>,
}

impl JsonStore {
    /// Opens the store, creating parent directories on first use. A missing
    /// file is an empty store.
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            RecordFile::default()
        };
        Ok(Self {
            path: Arc::new(path),
            state: Arc::new(Mutex::new(state)),
        })
    }

    async fn persist(&self, state: &RecordFile) -> Result<()> {
        let raw = serde_json::to_vec_pretty(state).context("Failed to encode record store")?;
        tokio::fs::write(self.path.as_ref(), raw)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl Store for JsonStore {
    async fn item_by_id(&self, id: i64) -> Result<Option<ContentItem>> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|item| item.id == id).cloned())
    }

    async fn upsert_item(&self, draft: ItemDraft) -> Result<ContentItem> {
        let mut state = self.state.lock().await;
        let item = if let Some(existing) = state
            .items
            .iter_mut()
            .find(|item| item.chat_id == draft.chat_id && item.message_id == draft.message_id)
        {
            existing.text = draft.text;
            existing.media_handle = draft.media_handle;
            existing.received_at = Utc::now();
            existing.clone()
        } else {
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
            state.items.push(item.clone());
            item
        };
        self.persist(&state).await?;
        Ok(item)
    }

    async fn save_item(&self, item: &ContentItem) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.items.iter_mut().find(|stored| stored.id == item.id) {
            *slot = item.clone();
        } else {
            state.items.push(item.clone());
        }
        self.persist(&state).await
    }

    async fn list_digest_items(&self, since: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<ContentItem> = state
            .items
            .iter()
            .filter(|item| item.in_digest && item.received_at >= since)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(items)
    }

    async fn digest_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DigestBatch>> {
        let state = self.state.lock().await;
        Ok(state
            .digests
            .iter()
            .find(|digest| digest.fingerprint == fingerprint)
            .cloned())
    }

    async fn upsert_digest(
        &self,
        fingerprint: &str,
        text: &str,
        member_ids: &[i64],
    ) -> Result<DigestBatch> {
        let mut state = self.state.lock().await;
        let batch = if let Some(existing) = state
            .digests
            .iter_mut()
            .find(|digest| digest.fingerprint == fingerprint)
        {
            existing.text = text.to_string();
            existing.member_ids = member_ids.to_vec();
            existing.clone()
        } else {
            let batch = DigestBatch {
                fingerprint: fingerprint.to_string(),
                text: text.to_string(),
                edited_text: None,
                member_ids: member_ids.to_vec(),
                created_at: Utc::now(),
                published_at: None,
            };
            state.digests.push(batch.clone());
            batch
        };
        self.persist(&state).await?;
        Ok(batch)
    }

    async fn set_digest_edited_text(&self, fingerprint: &str, edited_text: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(digest) = state
            .digests
            .iter_mut()
            .find(|digest| digest.fingerprint == fingerprint)
        else {
            return Ok(false);
        };
        digest.edited_text = Some(edited_text.to_string());
        self.persist(&state).await?;
        Ok(true)
    }

    async fn mark_digest_published(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(digest) = state
            .digests
            .iter_mut()
            .find(|digest| digest.fingerprint == fingerprint)
        else {
            return Ok(false);
        };
        digest.published_at = Some(at);
        self.persist(&state).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom_core::model::ContentKind;

    fn draft(message_id: i64, text: &str) -> ItemDraft {
        ItemDraft {
            chat_id: -42,
            chat_title: "Wire".to_string(),
            message_id,
            kind: ContentKind::Text,
            text: text.to_string(),
            media_handle: None,
            original_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = JsonStore::open(path.clone()).unwrap();
        let item = store.upsert_item(draft(1, "hello")).await.unwrap();
        store
            .upsert_digest("a1b2c3d4", "digest text", &[item.id])
            .await
            .unwrap();
        drop(store);

        let reopened = JsonStore::open(path).unwrap();
        let loaded = reopened.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(loaded.text, "hello");
        let digest = reopened
            .digest_by_fingerprint("a1b2c3d4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(digest.member_ids, vec![item.id]);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_by_natural_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("records.json")).unwrap();

        let first = store.upsert_item(draft(9, "v1")).await.unwrap();
        let second = store.upsert_item(draft(9, "v2")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.text, "v2");

        let third = store.upsert_item(draft(10, "other")).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_save_item_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("records.json")).unwrap();

        let mut item = store.upsert_item(draft(1, "raw")).await.unwrap();
        item.ai_text = Some("rewritten".to_string());
        item.stage = Stage::AiGenerated;
        store.save_item(&item).await.unwrap();

        let loaded = store.item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(loaded.ai_text.as_deref(), Some("rewritten"));
        assert_eq!(loaded.stage, Stage::AiGenerated);
    }

    #[tokio::test]
    async fn test_digest_listing_filters_flag_and_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("records.json")).unwrap();

        let mut flagged = store.upsert_item(draft(1, "in")).await.unwrap();
        flagged.in_digest = true;
        store.save_item(&flagged).await.unwrap();
        store.upsert_item(draft(2, "out")).await.unwrap();

        let listed = store
            .list_digest_items(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "in");

        let future = store
            .list_digest_items(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_updates_report_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("records.json")).unwrap();
        assert!(!store.set_digest_edited_text("ffffffff", "x").await.unwrap());
        assert!(!store
            .mark_digest_published("ffffffff", Utc::now())
            .await
            .unwrap());
    }
}

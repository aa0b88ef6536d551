//! Digest aggregation.
//!
//! Collects the items flagged for inclusion over a trailing window, rewrites
//! them as one combined summary and upserts the result keyed by a content
//! fingerprint, so rebuilding an identical digest refreshes the existing
//! batch instead of creating a sibling.

use std::collections::HashSet;
use std::fmt;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::fingerprint::fingerprint;
use crate::model::DigestBatch;
use crate::rewrite::{RewriteFailure, Rewriter};
use crate::store::Store;

/// Trailing collection window for digest candidates.
pub const DIGEST_WINDOW_HOURS: i64 = 24;

#[derive(Debug)]
pub enum DigestError {
    /// Invoker is not in the operator allowlist.
    AccessDenied,
    /// No digest batch with the given fingerprint exists.
    NotFound,
    Rewrite(RewriteFailure),
    Store(anyhow::Error),
}

impl fmt::Display for DigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestError::AccessDenied => write!(f, "access denied"),
            DigestError::NotFound => write!(f, "digest not found"),
            DigestError::Rewrite(failure) => write!(f, "digest rewrite failed: {failure}"),
            DigestError::Store(err) => write!(f, "store failed: {err}"),
        }
    }
}

impl std::error::Error for DigestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DigestError::Rewrite(failure) => Some(failure),
            DigestError::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for DigestError {
    fn from(err: anyhow::Error) -> Self {
        DigestError::Store(err)
    }
}

/// Outcome of a digest build. An empty window is an ordinary outcome, not an
/// error.
#[derive(Debug)]
pub enum DigestOutcome {
    /// No flagged items with usable text inside the window.
    Empty,
    Built(DigestBatch),
}

pub struct DigestAggregator<S, R> {
    store: S,
    rewriter: R,
    operators: HashSet<i64>,
}

impl<S, R> DigestAggregator<S, R>
where
    S: Store,
    R: Rewriter,
{
    pub fn new(store: S, rewriter: R, operators: HashSet<i64>) -> Self {
        Self {
            store,
            rewriter,
            operators,
        }
    }

    /// Builds (or refreshes) the digest for the trailing window.
    ///
    /// Gathers flagged items newest-first, batch-rewrites their canonical
    /// texts into one summary, and upserts it under the summary's
    /// fingerprint. Items whose canonical text is empty (media without a
    /// caption) contribute nothing and are skipped.
    pub async fn build_digest(&self, viewer_id: i64) -> Result<DigestOutcome, DigestError> {
        self.authorize(viewer_id)?;

        let since = Utc::now() - Duration::hours(DIGEST_WINDOW_HOURS);
        let items = self.store.list_digest_items(since).await?;
        if items.is_empty() {
            info!(viewer_id, "no flagged items in digest window");
            return Ok(DigestOutcome::Empty);
        }

        let mut texts = Vec::with_capacity(items.len());
        let mut member_ids = Vec::with_capacity(items.len());
        for item in &items {
            let text = item.variant_text(item.canonical_variant());
            if text.is_empty() {
                continue;
            }
            texts.push(text.to_string());
            member_ids.push(item.id);
        }
        if texts.is_empty() {
            info!(viewer_id, "flagged items carry no usable text");
            return Ok(DigestOutcome::Empty);
        }

        let digest_text = self
            .rewriter
            .rewrite_batch(&texts)
            .await
            .map_err(DigestError::Rewrite)?;
        let key = fingerprint(&digest_text);

        let batch = self
            .store
            .upsert_digest(&key, &digest_text, &member_ids)
            .await?;
        info!(
            viewer_id,
            fingerprint = %batch.fingerprint,
            members = batch.member_ids.len(),
            "digest batch built"
        );
        Ok(DigestOutcome::Built(batch))
    }

    pub async fn lookup(
        &self,
        fingerprint: &str,
        viewer_id: i64,
    ) -> Result<DigestBatch, DigestError> {
        self.authorize(viewer_id)?;
        self.store
            .digest_by_fingerprint(fingerprint)
            .await?
            .ok_or(DigestError::NotFound)
    }

    /// Replaces the digest's display text with an operator-edited version.
    /// The fingerprint stays keyed to the generated text, so later rebuilds
    /// of the same content still find this batch.
    pub async fn apply_edit(
        &self,
        fingerprint: &str,
        viewer_id: i64,
        new_text: &str,
    ) -> Result<DigestBatch, DigestError> {
        self.authorize(viewer_id)?;
        let updated = self
            .store
            .set_digest_edited_text(fingerprint, new_text)
            .await?;
        if !updated {
            return Err(DigestError::NotFound);
        }
        self.lookup(fingerprint, viewer_id).await
    }

    /// Marks the digest as published. Addressing a fingerprint that no
    /// longer resolves is reported, never fatal.
    pub async fn mark_published(
        &self,
        fingerprint: &str,
        viewer_id: i64,
    ) -> Result<(), DigestError> {
        self.authorize(viewer_id)?;
        let updated = self
            .store
            .mark_digest_published(fingerprint, Utc::now())
            .await?;
        if updated {
            info!(viewer_id, fingerprint, "digest published");
            Ok(())
        } else {
            warn!(viewer_id, fingerprint, "publish addressed unknown digest");
            Err(DigestError::NotFound)
        }
    }

    fn authorize(&self, viewer_id: i64) -> Result<(), DigestError> {
        if self.operators.contains(&viewer_id) {
            Ok(())
        } else {
            warn!(viewer_id, "unauthorized digest invocation rejected");
            Err(DigestError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentKind;
    use crate::store::{ItemDraft, MemoryStore};

    struct JoiningRewriter;

    impl Rewriter for JoiningRewriter {
        async fn rewrite(&self, text: &str) -> Result<String, RewriteFailure> {
            Ok(text.to_string())
        }

        async fn rewrite_batch(&self, texts: &[String]) -> Result<String, RewriteFailure> {
            Ok(texts.join(" | "))
        }
    }

    const OPERATOR: i64 = 7;

    fn aggregator(store: MemoryStore) -> DigestAggregator<MemoryStore, JoiningRewriter> {
        DigestAggregator::new(store, JoiningRewriter, HashSet::from([OPERATOR]))
    }

    async fn seed_flagged(store: &MemoryStore, message_id: i64, text: &str) -> i64 {
        let item = store
            .upsert_item(ItemDraft {
                chat_id: -1,
                chat_title: "News".to_string(),
                message_id,
                kind: ContentKind::Text,
                text: text.to_string(),
                media_handle: None,
                original_date: Utc::now(),
            })
            .await
            .unwrap();
        let mut flagged = item.clone();
        flagged.in_digest = true;
        flagged.processed_at = Some(Utc::now());
        store.save_item(&flagged).await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_empty_window_is_an_ordinary_outcome() {
        let agg = aggregator(MemoryStore::new());
        assert!(matches!(
            agg.build_digest(OPERATOR).await.unwrap(),
            DigestOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn test_build_digest_upserts_by_fingerprint() {
        let store = MemoryStore::new();
        let a = seed_flagged(&store, 1, "first story").await;
        let b = seed_flagged(&store, 2, "second story").await;
        let agg = aggregator(store);

        let DigestOutcome::Built(batch) = agg.build_digest(OPERATOR).await.unwrap() else {
            panic!("expected a built digest");
        };
        assert_eq!(batch.fingerprint.len(), 8);
        assert!(batch.text.contains("first story"));
        assert!(batch.member_ids.contains(&a));
        assert!(batch.member_ids.contains(&b));

        // Rebuilding identical content lands on the same batch.
        let DigestOutcome::Built(again) = agg.build_digest(OPERATOR).await.unwrap() else {
            panic!("expected a built digest");
        };
        assert_eq!(again.fingerprint, batch.fingerprint);
        assert_eq!(again.created_at, batch.created_at);
    }

    #[tokio::test]
    async fn test_items_without_text_are_skipped() {
        let store = MemoryStore::new();
        let item = store
            .upsert_item(ItemDraft {
                chat_id: -1,
                chat_title: "News".to_string(),
                message_id: 3,
                kind: ContentKind::Photo,
                text: String::new(),
                media_handle: Some("file-abc".to_string()),
                original_date: Utc::now(),
            })
            .await
            .unwrap();
        let mut flagged = item;
        flagged.in_digest = true;
        flagged.processed_at = Some(Utc::now());
        store.save_item(&flagged).await.unwrap();

        let agg = aggregator(store);
        assert!(matches!(
            agg.build_digest(OPERATOR).await.unwrap(),
            DigestOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn test_edited_text_supersedes_generated_for_display() {
        let store = MemoryStore::new();
        seed_flagged(&store, 1, "story").await;
        let agg = aggregator(store);

        let DigestOutcome::Built(batch) = agg.build_digest(OPERATOR).await.unwrap() else {
            panic!("expected a built digest");
        };
        let edited = agg
            .apply_edit(&batch.fingerprint, OPERATOR, "hand-tuned digest")
            .await
            .unwrap();
        assert_eq!(edited.display_text(), "hand-tuned digest");
        assert_eq!(edited.text, batch.text);
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_is_reported() {
        let agg = aggregator(MemoryStore::new());
        assert!(matches!(
            agg.mark_published("deadbeef", OPERATOR).await.unwrap_err(),
            DigestError::NotFound
        ));
        assert!(matches!(
            agg.apply_edit("deadbeef", OPERATOR, "x").await.unwrap_err(),
            DigestError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_outsider_is_rejected() {
        let agg = aggregator(MemoryStore::new());
        assert!(matches!(
            agg.build_digest(99).await.unwrap_err(),
            DigestError::AccessDenied
        ));
    }
}

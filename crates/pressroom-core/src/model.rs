//! Data model for items and digests.
//!
//! `ContentItem` and `DigestBatch` are owned by the persistent store; the
//! core only holds transient copies during a workflow step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content kind of an ingested message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl ContentKind {
    pub fn is_text(self) -> bool {
        matches!(self, ContentKind::Text)
    }
}

/// Which stored text an operation reads. Edited supersedes Ai supersedes Raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextVariant {
    Raw,
    Ai,
    Edited,
}

/// Editorial stage of an item.
///
/// The publish confirmation is an explicit stage on the item rather than
/// ambient per-conversation state, so a restart never loses a pending
/// preview silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum Stage {
    Ingested,
    AiGenerated,
    Edited,
    Previewing { variant: TextVariant },
    Published,
}

impl Stage {
    /// Whether a preview confirmation is pending.
    pub fn is_previewing(self) -> bool {
        matches!(self, Stage::Previewing { .. })
    }
}

/// One ingested message, keyed naturally by (source chat id, message id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub chat_id: i64,
    pub chat_title: String,
    pub message_id: i64,
    pub kind: ContentKind,
    /// Composed markup of the original message text.
    pub text: String,
    /// AI-rewritten variant, set by `generate_variant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_text: Option<String>,
    /// Manually edited variant; supersedes both raw and AI for display and
    /// publish until re-edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,
    /// Platform media handle (file id), carried for non-text kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_handle: Option<String>,
    pub in_digest: bool,
    pub stage: Stage,
    pub original_date: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Set when digest inclusion is toggled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// The text a given variant resolves to, empty string when unset.
    pub fn variant_text(&self, variant: TextVariant) -> &str {
        match variant {
            TextVariant::Raw => &self.text,
            TextVariant::Ai => self.ai_text.as_deref().unwrap_or(""),
            TextVariant::Edited => self.edited_text.as_deref().unwrap_or(""),
        }
    }

    /// Canonical variant for display and publish: the edited text when
    /// present, then the AI text, then the raw composed text.
    pub fn canonical_variant(&self) -> TextVariant {
        if self.edited_text.is_some() {
            TextVariant::Edited
        } else if self.ai_text.is_some() {
            TextVariant::Ai
        } else {
            TextVariant::Raw
        }
    }

    /// Stage implied by which variants exist, ignoring preview/publish.
    /// Used to restore an item after a cancelled preview.
    pub fn settled_stage(&self) -> Stage {
        if self.edited_text.is_some() {
            Stage::Edited
        } else if self.ai_text.is_some() {
            Stage::AiGenerated
        } else {
            Stage::Ingested
        }
    }
}

/// An aggregated batch of digest items, keyed by the fingerprint of its
/// composed text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestBatch {
    /// Identity key: a pure function of `text` (see [`crate::fingerprint`]).
    pub fingerprint: String,
    /// Composed digest text from the batch rewrite.
    pub text: String,
    /// Post-edit text, superseding `text` for display and publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,
    /// Member item ids, in batch order.
    pub member_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl DigestBatch {
    /// The text to display and publish: the edit when present, else the
    /// composed text.
    pub fn display_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.text)
    }
}

/// Rendering mode for a displayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Markup interpreted by the display sink.
    Marked,
    /// Sent verbatim, markup shown as literal text.
    Plain,
}

impl RenderMode {
    pub fn toggled(self) -> RenderMode {
        match self {
            RenderMode::Marked => RenderMode::Plain,
            RenderMode::Plain => RenderMode::Marked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ContentItem {
        ContentItem {
            id: 1,
            chat_id: -100,
            chat_title: "News".to_string(),
            message_id: 42,
            kind: ContentKind::Text,
            text: "raw".to_string(),
            ai_text: None,
            edited_text: None,
            media_handle: None,
            in_digest: false,
            stage: Stage::Ingested,
            original_date: Utc::now(),
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn test_canonical_variant_precedence() {
        let mut item = item();
        assert_eq!(item.canonical_variant(), TextVariant::Raw);
        item.ai_text = Some("ai".to_string());
        assert_eq!(item.canonical_variant(), TextVariant::Ai);
        item.edited_text = Some("edited".to_string());
        assert_eq!(item.canonical_variant(), TextVariant::Edited);
    }

    #[test]
    fn test_settled_stage_follows_variants() {
        let mut item = item();
        assert_eq!(item.settled_stage(), Stage::Ingested);
        item.ai_text = Some("ai".to_string());
        assert_eq!(item.settled_stage(), Stage::AiGenerated);
        item.edited_text = Some("edited".to_string());
        assert_eq!(item.settled_stage(), Stage::Edited);
    }

    #[test]
    fn test_variant_text_defaults_to_empty() {
        let item = item();
        assert_eq!(item.variant_text(TextVariant::Ai), "");
        assert_eq!(item.variant_text(TextVariant::Raw), "raw");
    }

    #[test]
    fn test_render_mode_toggle_round_trips() {
        assert_eq!(RenderMode::Marked.toggled().toggled(), RenderMode::Marked);
    }
}

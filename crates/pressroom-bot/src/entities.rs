//! Wire formatting entities to style spans.

use pressroom_core::markup::{SpanKind, StyleSpan};

use crate::telegram::MessageEntity;

/// Converts platform entities into style spans, dropping kinds the
/// compositor has no rendering for. Offsets pass through untranslated; the
/// compositor owns the UTF-16 mapping.
pub fn spans_from_entities(entities: &[MessageEntity]) -> Vec<StyleSpan> {
    entities
        .iter()
        .filter_map(|entity| {
            let kind = match entity.kind.as_str() {
                "bold" => SpanKind::Bold,
                "italic" => SpanKind::Italic,
                "code" => SpanKind::Code,
                "pre" => SpanKind::Pre {
                    language: entity.language.clone(),
                },
                "text_link" => SpanKind::TextLink {
                    url: entity.url.clone()?,
                },
                "url" => SpanKind::Url,
                "mention" => SpanKind::Mention,
                "hashtag" => SpanKind::Hashtag,
                "strikethrough" => SpanKind::Strikethrough,
                "blockquote" => SpanKind::Blockquote,
                _ => return None,
            };
            Some(StyleSpan {
                kind,
                offset: entity.offset,
                length: entity.length,
            })
        })
        .collect()
}

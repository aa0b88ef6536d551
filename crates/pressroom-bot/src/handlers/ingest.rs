//! Channel-post ingestion and operator fan-out.
//!
//! Each accepted post is composed into markup, upserted into the store by
//! its natural key, and forwarded to every operator with the item action
//! keyboard. Media groups are skipped; the bot handles single messages only.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use pressroom_core::markup::{compose, escape_text};
use pressroom_core::model::{ContentKind, RenderMode, TextVariant};
use pressroom_core::store::{ItemDraft, Store};
use pressroom_core::viewstate::ViewState;

use crate::bot::BotContext;
use crate::entities::spans_from_entities;
use crate::keyboards::item_keyboard;
use crate::telegram::{Message, PhotoSize};

pub(crate) async fn handle_channel_post(context: &BotContext, message: Message) -> Result<()> {
    if message.media_group_id.is_some() {
        debug!(chat_id = message.chat.id, "skipping media-group member");
        return Ok(());
    }

    let (kind, media_handle) = classify_media(&message);
    let raw_text = message.text_or_caption().unwrap_or("");
    if raw_text.is_empty() && media_handle.is_none() {
        debug!(chat_id = message.chat.id, "skipping empty channel post");
        return Ok(());
    }

    let spans = spans_from_entities(message.entities_or_caption_entities());
    let rendered = compose(raw_text, &spans);

    let chat_title = message
        .chat
        .title
        .clone()
        .unwrap_or_else(|| message.chat.id.to_string());
    let original_date =
        DateTime::<Utc>::from_timestamp(message.date, 0).unwrap_or_else(Utc::now);

    let item = context
        .store()
        .upsert_item(ItemDraft {
            chat_id: message.chat.id,
            chat_title: chat_title.clone(),
            message_id: message.message_id,
            kind,
            text: rendered.html,
            media_handle: media_handle.clone(),
            original_date,
        })
        .await?;

    let body = format!("<b>{}</b>\n\n{}", escape_text(&chat_title), item.text);
    let actions = item_keyboard(item.id, TextVariant::Raw);

    for &operator in context.operator_ids() {
        let sent = if let Some(handle) = media_handle.as_deref() {
            context
                .client()
                .send_media(
                    operator,
                    kind,
                    handle,
                    &body,
                    RenderMode::Marked,
                    Some(&actions),
                )
                .await
        } else {
            context
                .client()
                .send_message(operator, &body, RenderMode::Marked, Some(&actions))
                .await
        };
        match sent {
            Ok(shown) => {
                context.engine().viewstate().set(
                    item.id,
                    operator,
                    ViewState::new(RenderMode::Marked, shown.message_id),
                );
            }
            Err(err) => {
                // One unreachable operator must not block the rest.
                warn!(operator, item_id = item.id, %err, "fan-out delivery failed");
            }
        }
    }

    Ok(())
}

fn classify_media(message: &Message) -> (ContentKind, Option<String>) {
    if let Some(photos) = message.photo.as_deref()
        && let Some(best) = select_best_photo(photos)
    {
        return (ContentKind::Photo, Some(best.file_id.clone()));
    }
    if let Some(video) = message.video.as_ref() {
        return (ContentKind::Video, Some(video.file_id.clone()));
    }
    if let Some(document) = message.document.as_ref() {
        return (ContentKind::Document, Some(document.file_id.clone()));
    }
    if let Some(audio) = message.audio.as_ref() {
        return (ContentKind::Audio, Some(audio.file_id.clone()));
    }
    if let Some(voice) = message.voice.as_ref() {
        return (ContentKind::Voice, Some(voice.file_id.clone()));
    }
    (ContentKind::Text, None)
}

fn select_best_photo(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|photo| {
        let size = photo.file_size.unwrap_or(0);
        let area = (photo.width.max(0) as u64) * (photo.height.max(0) as u64);
        (size, area)
    })
}

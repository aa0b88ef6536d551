//! Digest display and publication handlers.
//!
//! Digest displays are addressed by fingerprint. The generated text is
//! plain, so displays start without a parse mode; the markup toggle mirrors
//! the item toggle, including the escaped fallback when the platform
//! rejects the text as markup.

use anyhow::Result;
use tracing::warn;

use pressroom_core::digest::{DigestError, DigestOutcome};
use pressroom_core::markup::escape_text;
use pressroom_core::model::{DigestBatch, RenderMode};
use pressroom_core::sink::SinkError;

use crate::bot::BotContext;
use crate::handlers::post::notify;
use crate::keyboards::{digest_confirm_keyboard, digest_keyboard};
use crate::telegram::ApiError;

pub(crate) async fn build_and_show(context: &BotContext, viewer_id: i64) -> Result<()> {
    match context.aggregator().build_digest(viewer_id).await {
        Ok(DigestOutcome::Empty) => {
            notify(
                context,
                viewer_id,
                "No posts were flagged for the digest in the last 24 hours.",
            )
            .await;
        }
        Ok(DigestOutcome::Built(batch)) => show(context, viewer_id, &batch).await?,
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

pub(crate) async fn toggle(
    context: &BotContext,
    viewer_id: i64,
    fingerprint: &str,
    message_id: i64,
) -> Result<()> {
    let batch = match context.aggregator().lookup(fingerprint, viewer_id).await {
        Ok(batch) => batch,
        Err(err) => {
            report(context, viewer_id, &err).await;
            return Ok(());
        }
    };

    let new_mode = context.digest_mode(fingerprint, viewer_id).toggled();
    let actions = digest_keyboard(fingerprint);
    let text = batch.display_text();
    let edited = context
        .client()
        .edit_message_text(viewer_id, message_id, text, new_mode, Some(&actions))
        .await
        .map_err(SinkError::from);
    match edited {
        Ok(()) | Err(SinkError::Unchanged) => {}
        Err(SinkError::MarkupRejected) => {
            context
                .client()
                .edit_message_text(
                    viewer_id,
                    message_id,
                    &escape_text(text),
                    RenderMode::Plain,
                    Some(&actions),
                )
                .await?;
        }
        Err(SinkError::Other(message)) => {
            warn!(viewer_id, fingerprint, %message, "digest toggle failed");
            notify(context, viewer_id, &message).await;
            return Ok(());
        }
    }
    context.set_digest_mode(fingerprint, viewer_id, new_mode);
    Ok(())
}

pub(crate) async fn request_edit(
    context: &BotContext,
    viewer_id: i64,
    fingerprint: &str,
) -> Result<()> {
    match context.aggregator().lookup(fingerprint, viewer_id).await {
        Ok(batch) => {
            context.set_pending_digest_edit(viewer_id, fingerprint.to_string());
            let prompt = format!(
                "Current digest:\n\n{}\n\nSend the replacement, or /cancel to keep it.",
                batch.display_text()
            );
            context
                .client()
                .send_message(viewer_id, &prompt, RenderMode::Plain, None)
                .await?;
        }
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

/// Stores the operator's replacement text and re-displays the digest with a
/// fresh keyboard.
pub(crate) async fn apply_edit(context: &BotContext, viewer_id: i64, text: &str) -> Result<()> {
    let Some(fingerprint) = context.take_pending_digest_edit(viewer_id) else {
        return Ok(());
    };
    match context
        .aggregator()
        .apply_edit(&fingerprint, viewer_id, text)
        .await
    {
        Ok(batch) => show(context, viewer_id, &batch).await?,
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

pub(crate) async fn request_publish(
    context: &BotContext,
    viewer_id: i64,
    fingerprint: &str,
) -> Result<()> {
    match context.aggregator().lookup(fingerprint, viewer_id).await {
        Ok(batch) => {
            context
                .client()
                .send_message(viewer_id, batch.display_text(), RenderMode::Plain, None)
                .await?;
            let actions = digest_confirm_keyboard(fingerprint);
            context
                .client()
                .send_message(
                    viewer_id,
                    "Publish this digest to the channel?",
                    RenderMode::Plain,
                    Some(&actions),
                )
                .await?;
        }
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

pub(crate) async fn confirm_publish(
    context: &BotContext,
    viewer_id: i64,
    fingerprint: &str,
) -> Result<()> {
    let batch = match context.aggregator().lookup(fingerprint, viewer_id).await {
        Ok(batch) => batch,
        Err(err) => {
            report(context, viewer_id, &err).await;
            return Ok(());
        }
    };

    if let Err(err) = send_to_channel(context, batch.display_text()).await {
        notify(context, viewer_id, &err.to_string()).await;
        return Ok(());
    }
    match context
        .aggregator()
        .mark_published(fingerprint, viewer_id)
        .await
    {
        Ok(()) => notify(context, viewer_id, "Digest published.").await,
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

pub(crate) async fn cancel_publish(
    context: &BotContext,
    viewer_id: i64,
    fingerprint: &str,
) -> Result<()> {
    let _ = fingerprint;
    notify(context, viewer_id, "Digest publication cancelled.").await;
    Ok(())
}

async fn show(context: &BotContext, viewer_id: i64, batch: &DigestBatch) -> Result<()> {
    let actions = digest_keyboard(&batch.fingerprint);
    let mode = context.digest_mode(&batch.fingerprint, viewer_id);
    context
        .client()
        .send_message(viewer_id, batch.display_text(), mode, Some(&actions))
        .await?;
    Ok(())
}

/// Publishes text to the channel, degrading to escaped plain text when the
/// platform rejects it as markup.
async fn send_to_channel(context: &BotContext, text: &str) -> Result<(), ApiError> {
    let first = context
        .client()
        .send_message(context.channel_id(), text, RenderMode::Marked, None)
        .await;
    match first.map(|_| ()).map_err(SinkError::from) {
        Ok(()) => Ok(()),
        Err(SinkError::MarkupRejected) => context
            .client()
            .send_message(
                context.channel_id(),
                &escape_text(text),
                RenderMode::Plain,
                None,
            )
            .await
            .map(|_| ()),
        Err(other) => Err(ApiError::Api(other.to_string())),
    }
}

/// Digest failures reach the operator as text; the rewrite failure string is
/// surfaced verbatim.
async fn report(context: &BotContext, viewer_id: i64, err: &DigestError) {
    let text = match err {
        DigestError::Rewrite(failure) => failure.message.clone(),
        other => other.to_string(),
    };
    notify(context, viewer_id, &text).await;
}

//! Operator-facing handlers: callback buttons and direct messages.

use anyhow::Result;
use tracing::{debug, warn};

use pressroom_core::model::{RenderMode, TextVariant};
use pressroom_core::viewstate::ViewState;
use pressroom_core::workflow::{DigestFlag, WorkflowError};

use crate::bot::BotContext;
use crate::commands::Command;
use crate::handlers::digest;
use crate::keyboards::{item_keyboard, publish_confirm_keyboard};
use crate::telegram::{CallbackQuery, Message};

pub(crate) async fn handle_callback(context: &BotContext, query: CallbackQuery) -> Result<()> {
    // Always acknowledge, even for data we end up dropping; otherwise the
    // client keeps the button spinner running.
    if let Err(err) = context.client().answer_callback_query(&query.id, None).await {
        warn!(%err, "failed to acknowledge callback");
    }

    let viewer_id = query.from.id;
    let Some(command) = query.data.as_deref().and_then(Command::parse) else {
        debug!(viewer_id, "dropping unparseable callback data");
        return Ok(());
    };
    let message_id = query.message.as_ref().map_or(0, |m| m.message_id);

    match command {
        Command::GenerateAi(item_id) => {
            match context.engine().generate_variant(item_id, viewer_id).await {
                Ok(item) => {
                    let actions = item_keyboard(item.id, TextVariant::Ai);
                    let shown = context
                        .client()
                        .send_message(
                            viewer_id,
                            item.variant_text(TextVariant::Ai),
                            RenderMode::Plain,
                            Some(&actions),
                        )
                        .await?;
                    context.engine().viewstate().set(
                        item.id,
                        viewer_id,
                        ViewState::new(RenderMode::Plain, shown.message_id),
                    );
                }
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::ToggleMarkup(item_id, variant) => {
            let actions = item_keyboard(item_id, variant);
            if let Err(err) = context
                .engine()
                .toggle_markup(item_id, viewer_id, variant, message_id, &actions)
                .await
            {
                report(context, viewer_id, &err).await;
            }
        }
        Command::Edit(item_id, variant) => {
            match context.engine().request_edit(item_id, viewer_id, variant).await {
                Ok(current) => {
                    let prompt = format!(
                        "Current text:\n\n{current}\n\nSend the replacement, or /cancel to keep it."
                    );
                    context
                        .client()
                        .send_message(viewer_id, &prompt, RenderMode::Plain, None)
                        .await?;
                }
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::Publish(item_id, variant) => {
            match context
                .engine()
                .request_publish(item_id, viewer_id, variant)
                .await
            {
                Ok(()) => {
                    let actions = publish_confirm_keyboard(item_id);
                    context
                        .client()
                        .send_message(
                            viewer_id,
                            "Publish this post to the channel?",
                            RenderMode::Plain,
                            Some(&actions),
                        )
                        .await?;
                }
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::ConfirmPublish(item_id) => {
            match context.engine().confirm_publish(item_id, viewer_id).await {
                Ok(()) => notify(context, viewer_id, "Published.").await,
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::CancelPublish(item_id) => {
            match context.engine().cancel_publish(item_id, viewer_id).await {
                Ok(_) => notify(context, viewer_id, "Publication cancelled.").await,
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::AddToDigest(item_id) => {
            match context.engine().set_in_digest(item_id, viewer_id).await {
                Ok(DigestFlag::Added) => notify(context, viewer_id, "Added to the digest.").await,
                Ok(DigestFlag::AlreadyIncluded) => {
                    notify(context, viewer_id, "Already in the digest.").await;
                }
                Err(err) => report(context, viewer_id, &err).await,
            }
        }
        Command::BuildDigest => digest::build_and_show(context, viewer_id).await?,
        Command::DigestToggle(fingerprint) => {
            digest::toggle(context, viewer_id, &fingerprint, message_id).await?;
        }
        Command::DigestEdit(fingerprint) => {
            digest::request_edit(context, viewer_id, &fingerprint).await?;
        }
        Command::DigestPublish(fingerprint) => {
            digest::request_publish(context, viewer_id, &fingerprint).await?;
        }
        Command::DigestConfirm(fingerprint) => {
            digest::confirm_publish(context, viewer_id, &fingerprint).await?;
        }
        Command::DigestCancel(fingerprint) => {
            digest::cancel_publish(context, viewer_id, &fingerprint).await?;
        }
    }

    Ok(())
}

pub(crate) async fn handle_operator_message(context: &BotContext, message: Message) -> Result<()> {
    if !message.chat.is_private() {
        debug!(chat_id = message.chat.id, "ignoring non-DM chat");
        return Ok(());
    }
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    let viewer_id = user.id;
    if !context.engine().is_operator(viewer_id) {
        debug!(viewer_id, "ignoring message from non-operator");
        let _ = context
            .client()
            .send_message(message.chat.id, "Access denied.", RenderMode::Plain, None)
            .await;
        return Ok(());
    }
    let Some(text) = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(());
    };

    match text {
        "/start" | "/help" => {
            notify(
                context,
                viewer_id,
                "Forward of every channel post arrives here with action buttons. \
                 /digest builds the daily digest, /cancel abandons an edit in progress.",
            )
            .await;
        }
        "/cancel" => {
            if context.take_pending_digest_edit(viewer_id).is_some() {
                notify(context, viewer_id, "Digest edit cancelled.").await;
            } else if context.engine().cancel_edit(viewer_id) {
                notify(context, viewer_id, "Edit cancelled.").await;
            } else {
                notify(context, viewer_id, "Nothing to cancel.").await;
            }
        }
        "/digest" => digest::build_and_show(context, viewer_id).await?,
        _ => {
            if context.pending_digest_edit(viewer_id).is_some() {
                digest::apply_edit(context, viewer_id, text).await?;
            } else if context.engine().pending_edit(viewer_id).is_some() {
                apply_item_edit(context, viewer_id, text).await?;
            } else {
                debug!(viewer_id, "ignoring text outside an edit session");
            }
        }
    }

    Ok(())
}

async fn apply_item_edit(context: &BotContext, viewer_id: i64, text: &str) -> Result<()> {
    match context.engine().apply_edit(viewer_id, text).await {
        Ok(item) => {
            let actions = item_keyboard(item.id, TextVariant::Edited);
            let shown = context
                .client()
                .send_message(
                    viewer_id,
                    item.variant_text(TextVariant::Edited),
                    RenderMode::Plain,
                    Some(&actions),
                )
                .await?;
            context.engine().viewstate().set(
                item.id,
                viewer_id,
                ViewState::new(RenderMode::Plain, shown.message_id),
            );
        }
        Err(err) => report(context, viewer_id, &err).await,
    }
    Ok(())
}

/// Sends a short status line to the viewer; delivery failures only log.
pub(crate) async fn notify(context: &BotContext, viewer_id: i64, text: &str) {
    if let Err(err) = context
        .client()
        .send_message(viewer_id, text, RenderMode::Plain, None)
        .await
    {
        warn!(viewer_id, %err, "failed to deliver notice");
    }
}

/// Reports a workflow failure to the viewer. Rewrite failures carry the
/// collaborator's message verbatim, everything else its display form.
async fn report(context: &BotContext, viewer_id: i64, err: &WorkflowError) {
    let text = match err {
        WorkflowError::Rewrite(failure) => failure.message.clone(),
        other => other.to_string(),
    };
    notify(context, viewer_id, &text).await;
}

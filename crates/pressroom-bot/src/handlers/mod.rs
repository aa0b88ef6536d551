pub(crate) mod digest;
pub(crate) mod ingest;
pub(crate) mod post;

use tracing::error;

use crate::bot::BotContext;
use crate::telegram::Update;

/// Routes one polled update to its handler. Handler failures are logged and
/// never tear down the polling loop.
pub(crate) async fn dispatch_update(context: &BotContext, update: Update) {
    if let Some(message) = update.channel_post {
        if let Err(err) = ingest::handle_channel_post(context, message).await {
            error!(update_id = update.update_id, %err, "channel post handling failed");
        }
        return;
    }
    if let Some(message) = update.message {
        if let Err(err) = post::handle_operator_message(context, message).await {
            error!(update_id = update.update_id, %err, "message handling failed");
        }
        return;
    }
    if let Some(query) = update.callback_query {
        if let Err(err) = post::handle_callback(context, query).await {
            error!(update_id = update.update_id, %err, "callback handling failed");
        }
    }
}

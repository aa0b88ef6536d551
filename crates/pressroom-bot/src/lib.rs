//! Telegram editorial bot: ingests channel posts, walks each one through the
//! editorial workflow and publishes posts or daily digests to a channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use pressroom_core::config::{Config, paths};
use pressroom_core::digest::DigestAggregator;
use pressroom_core::viewstate::ViewStateCache;
use pressroom_core::workflow::WorkflowEngine;

use crate::bot::BotContext;
use crate::rewrite::HttpRewriter;
use crate::store::JsonStore;
use crate::telegram::{TelegramClient, TelegramSettings};

mod bot;
mod commands;
mod entities;
mod handlers;
mod keyboards;
mod rewrite;
mod store;
mod telegram;

pub async fn run() -> Result<()> {
    let config = Config::load()?;
    let settings = TelegramSettings::from_config(&config)?;
    let config_path = paths::config_path();
    if config_path.exists() {
        info!(path = %config_path.display(), "loaded config file");
    }
    run_bot(config, settings).await
}

async fn run_bot(config: Config, settings: TelegramSettings) -> Result<()> {
    let client = TelegramClient::new(settings.bot_token);
    let store = JsonStore::open(paths::store_path())?;
    let rewriter = HttpRewriter::new(&config.rewrite);
    let viewstate = Arc::new(ViewStateCache::new());

    let engine = WorkflowEngine::new(
        store.clone(),
        rewriter.clone(),
        client.clone(),
        settings.operator_ids.clone(),
        settings.channel_id,
        Arc::clone(&viewstate),
    );
    let aggregator = DigestAggregator::new(
        store.clone(),
        rewriter,
        settings.operator_ids.clone(),
    );
    let context = Arc::new(BotContext::new(
        client.clone(),
        engine,
        aggregator,
        store,
        settings.operator_ids,
        settings.channel_id,
    ));

    let mut offset: Option<i64> = None;
    let poll_timeout = Duration::from_secs(30);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        operators = context.operator_ids().len(),
        channel_id = context.channel_id(),
        "pressroom-bot started, polling for updates"
    );

    loop {
        let current_offset = offset;
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            updates = client.get_updates(current_offset, poll_timeout) => {
                let updates = match updates {
                    Ok(updates) => updates,
                    Err(err) => {
                        error!(%err, "polling failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = Some(update.update_id + 1);
                    let context = Arc::clone(&context);
                    tokio::spawn(async move {
                        handlers::dispatch_update(&context, update).await;
                    });
                }
            }
        }
    }

    Ok(())
}

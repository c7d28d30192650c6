//! Telegram dispatch root module

mod cmd;
mod gate;
mod membership;

use crate::observability::metrics::TG_UPDATES;
use crate::prelude::*;
use crate::subscription::SubscriptionGate;
use crate::Result;
use dptree::di::DependencyMap;
use serde::Deserialize;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, DefaultParseMode, Throttle, Trace};
use teloxide::prelude::*;
use teloxide::types::{ParseMode, UpdateKind};
use teloxide::utils::command::BotCommands;

pub(crate) use membership::TgMembershipOracle;

pub(crate) type Bot = Trace<CacheMe<DefaultParseMode<Throttle<teloxide::Bot>>>>;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,
}

pub(crate) struct Ctx {
    bot: Bot,
    gate: SubscriptionGate,
}

pub(crate) fn create_bot(cfg: &Config) -> Bot {
    teloxide::Bot::new(cfg.token.clone())
        .throttle(Default::default())
        .parse_mode(ParseMode::MarkdownV2)
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all())
}

pub(crate) async fn run_bot(bot: Bot, gate: SubscriptionGate) -> Result {
    let mut di = DependencyMap::new();

    di.insert(Arc::new(Ctx {
        bot: bot.clone(),
        gate,
    }));

    info!("Starting bot...");

    bot.set_my_commands(cmd::Cmd::bot_commands()).await?;

    let handler = dptree::entry()
        .inspect(|update: Update| {
            metrics::counter!(TG_UPDATES, "kind" => update_kind(&update)).increment(1);
        })
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::Cmd>()
                .endpoint(cmd::handle::<cmd::Cmd>()),
        )
        .branch(Update::filter_callback_query().endpoint(gate::handle_callback_query))
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .endpoint(gate::handle_private_message),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(di)
        // Messages in groups and channels are not handled, so we have
        // a noop default handler here to suppress the warning about them
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");

    Ok(())
}

fn update_kind(update: &Update) -> &'static str {
    match &update.kind {
        UpdateKind::Message(_) => "message",
        UpdateKind::CallbackQuery(_) => "callback_query",
        _ => "other",
    }
}

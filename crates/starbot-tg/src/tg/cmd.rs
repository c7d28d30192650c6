use super::gate;
use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::User;
use teloxide::utils::command::BotCommands;
use teloxide::utils::markdown;

#[async_trait]
pub(crate) trait Command: fmt::Debug + Send + Sync + 'static {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result;
}

pub(crate) fn handle<'a, C: Command>(
) -> impl Fn(Arc<tg::Ctx>, Message, C) -> BoxFuture<'a, DynResult> {
    move |ctx, msg, cmd| {
        let info = info_span!(
            "handle_message",
            sender = msg.from.as_ref().map(User::debug_id).as_deref(),
            chat = %msg.chat.id,
            cmd = format_args!("{cmd:?}")
        );

        let fut = async move {
            debug!("Processing command");

            let result = cmd.handle(&ctx, &msg).await;
            if let Err(err) = &result {
                let span = warn_span!("err", err = tracing_err(err), id = err.id());
                async {
                    warn!("Command handler returned an error");

                    let reply_msg = format!(
                        "Something went wrong, please try again later\\.\n\nError id: {}",
                        markdown::code_inline(err.id())
                    );

                    let msg_result = ctx.bot.send_message(msg.chat.id, reply_msg).await;

                    if let Err(err) = msg_result {
                        warn!(
                            err = tracing_err(&err),
                            "Failed to reply with the error message to the user"
                        );
                    }
                }
                .instrument(span)
                .await;
            }
            result.map_err(Into::into)
        };

        Box::pin(fut.instrument(info))
    }
}

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "The following commands are available:"
)]
pub(crate) enum Cmd {
    #[command(description = "start the bot")]
    Start,

    #[command(description = "check your channel subscriptions again")]
    Check,

    #[command(description = "display this text")]
    Help,
}

#[async_trait]
impl Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let Some(user) = &msg.from else {
            debug!("Ignoring a command without a sender");
            return Ok(());
        };

        match self {
            Cmd::Start | Cmd::Check => gate::send_prompt(ctx, msg.chat.id, user).await?,
            Cmd::Help => {
                let help = markdown::escape(&Cmd::descriptions().to_string());
                ctx.bot.send_message(msg.chat.id, help).await?;
            }
        }
        Ok(())
    }
}

pub(crate) fn filter_pm_with_bot(msg: Message) -> bool {
    msg.chat.is_private()
}

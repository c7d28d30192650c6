//! Chat side of the subscription gate: prompts with their buttons, the
//! re-check callbacks and the answers to the sponsor provider's questions.

use super::Ctx;
use crate::prelude::*;
use crate::subscription::{ButtonAction, GateCallback, GateVerdict, PromptButton};
use crate::util::DynResult;
use crate::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, User};
use teloxide::ApiError;

const MAIN_MENU: &str = "🏠 *Main menu*\n\nYou have full access to the bot\\.";

/// Evaluates the gate and sends the resulting prompt as a new message.
pub(crate) async fn send_prompt(ctx: &Ctx, chat_id: ChatId, user: &User) -> Result {
    let verdict = ctx.gate.check(user.id, true).await;

    ctx.bot
        .send_message(chat_id, verdict.message)
        .reply_markup(keyboard(&verdict.buttons))
        .await?;

    Ok(())
}

/// Any other private message is allowed only for users who passed the gate.
pub(crate) async fn handle_private_message(ctx: Arc<Ctx>, msg: Message) -> DynResult {
    let Some(user) = &msg.from else {
        return Ok(());
    };

    let span = info_span!("handle_private_message", user = %user.debug_id());

    async {
        if !ctx.gate.can_user_proceed(user.id).await {
            debug!("User hasn't passed the gate yet, showing the prompt");
            return send_prompt(&ctx, msg.chat.id, user).await;
        }

        ctx.bot
            .send_message(msg.chat.id, MAIN_MENU)
            .reply_markup(main_menu_keyboard())
            .await?;

        Ok(())
    }
    .instrument(span)
    .await
    .map_err(|err: crate::Error| {
        warn!(err = tracing_err(&err), "Failed to handle a private message");
        err.into()
    })
}

pub(crate) async fn handle_callback_query(ctx: Arc<Ctx>, query: CallbackQuery) -> DynResult {
    let span = info_span!(
        "handle_callback_query",
        user = %query.from.debug_id(),
        data = query.data.as_deref(),
    );

    handle_callback_query_imp(&ctx, &query)
        .instrument(span)
        .await
        .map_err(|err| {
            warn!(err = tracing_err(&err), "Failed to handle a callback query");
            err.into()
        })
}

async fn handle_callback_query_imp(ctx: &Ctx, query: &CallbackQuery) -> Result {
    let callback = query
        .data
        .as_deref()
        .and_then(|data| data.parse::<GateCallback>().ok());

    let Some(callback) = callback else {
        debug!("Ignoring unknown callback query");
        ctx.bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };

    let user_id = query.from.id;

    let (verdict, toast) = match callback.gender() {
        Some(gender) => (
            ctx.gate.choose_gender(user_id, gender).await,
            Some("👌 Got it, thanks!"),
        ),
        None => {
            // Main menu doesn't count as an explicit subscription check
            let record_stats = callback != GateCallback::MainMenu;

            let verdict = ctx.gate.check(user_id, record_stats).await;

            let toast = match (callback, verdict.all_completed) {
                (GateCallback::MainMenu, true) => None,
                (_, true) => Some("✅ Thanks for subscribing!"),
                (_, false) => Some("❌ You haven't subscribed to all channels yet"),
            };

            (verdict, toast)
        }
    };

    let mut answer = ctx.bot.answer_callback_query(query.id.clone());
    if let Some(toast) = toast {
        answer = answer.text(toast);
    }
    answer.await?;

    let (text, markup) = if callback == GateCallback::MainMenu && verdict.all_completed {
        (MAIN_MENU.to_owned(), main_menu_keyboard())
    } else {
        let GateVerdict {
            message, buttons, ..
        } = verdict;
        (message, keyboard(&buttons))
    };

    let Some(message) = &query.message else {
        ctx.bot
            .send_message(ChatId::from(user_id), text)
            .reply_markup(markup)
            .await?;
        return Ok(());
    };

    edit_prompt(ctx, message.chat().id, message.id(), text, markup).await
}

async fn edit_prompt(
    ctx: &Ctx,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
    markup: InlineKeyboardMarkup,
) -> Result {
    let result = ctx
        .bot
        .edit_message_text(chat_id, message_id, text)
        .reply_markup(markup)
        .await;

    match result {
        Ok(_) => Ok(()),
        // The prompt didn't change between two checks
        Err(teloxide::RequestError::Api(ApiError::MessageNotModified)) => {
            debug!("Prompt is already up to date");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn keyboard(buttons: &[Vec<PromptButton>]) -> InlineKeyboardMarkup {
    let rows = buttons.iter().map(|row| {
        row.iter()
            .map(|button| match &button.action {
                ButtonAction::Url(url) => InlineKeyboardButton::url(button.text.clone(), url.clone()),
                ButtonAction::Callback(callback) => {
                    InlineKeyboardButton::callback(button.text.clone(), callback.to_string())
                }
            })
            .collect::<Vec<_>>()
    });

    InlineKeyboardMarkup::new(rows)
}

fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        "🔄 Check subscriptions",
        GateCallback::CheckRetry.to_string(),
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;
    use url::Url;

    #[test]
    fn prompt_buttons_become_inline_keyboard() {
        let link = Url::parse("https://t.me/starnews").unwrap();
        let buttons = vec![
            vec![PromptButton {
                text: "➕ Star News".to_owned(),
                action: ButtonAction::Url(link.clone()),
            }],
            vec![PromptButton {
                text: "✅ I've subscribed".to_owned(),
                action: ButtonAction::Callback(GateCallback::CheckSponsors),
            }],
        ];

        let markup = keyboard(&buttons);

        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(
            markup.inline_keyboard[0][0].kind,
            InlineKeyboardButtonKind::Url(link)
        );
        assert_eq!(
            markup.inline_keyboard[1][0].kind,
            InlineKeyboardButtonKind::CallbackData("check_sponsors".to_owned())
        );
    }

    #[test]
    fn gender_buttons_share_a_row() {
        let evaluation = crate::subscription::StageEvaluation::awaiting_gender();
        let prompt = crate::subscription::format_stage(&evaluation);

        let markup = keyboard(&prompt.buttons);

        let data = markup.inline_keyboard[0]
            .iter()
            .map(|button| button.kind.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            data,
            [
                InlineKeyboardButtonKind::CallbackData("subgram_gender_male".to_owned()),
                InlineKeyboardButtonKind::CallbackData("subgram_gender_female".to_owned()),
            ]
        );
    }
}

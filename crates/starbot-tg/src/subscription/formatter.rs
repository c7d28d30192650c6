//! Renders a [`StageEvaluation`] into a MarkdownV2 message with an inline
//! keyboard. Pure and deterministic, the same evaluation always gives the
//! same prompt.

use super::{CheckedChannel, EvaluationError, Gender, NextAction, Stage, StageEvaluation};
use teloxide::utils::markdown;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagePrompt {
    pub(crate) message: String,

    /// Rows of buttons, top to bottom.
    pub(crate) buttons: Vec<Vec<PromptButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PromptButton {
    pub(crate) text: String,
    pub(crate) action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ButtonAction {
    Url(Url),
    Callback(GateCallback),
}

/// Callback data attached to the gate's inline buttons.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum GateCallback {
    CheckSponsors,
    CheckRequired,
    CheckRetry,
    MainMenu,
    SubgramGenderMale,
    SubgramGenderFemale,
}

impl GateCallback {
    pub(crate) fn gender(self) -> Option<Gender> {
        match self {
            Self::SubgramGenderMale => Some(Gender::Male),
            Self::SubgramGenderFemale => Some(Gender::Female),
            _ => None,
        }
    }
}

pub(crate) fn format_stage(evaluation: &StageEvaluation) -> StagePrompt {
    if evaluation.all_completed() {
        return completed_prompt();
    }

    if evaluation.next_action() == NextAction::ChooseGender {
        return gender_prompt();
    }

    let channels = evaluation.channels_to_show();

    if channels.is_empty() {
        return anomaly_prompt(evaluation.error());
    }

    match evaluation.stage() {
        Stage::Sponsors => channels_prompt(
            "📢 *Subscribe to our sponsors*",
            "To start using the bot, subscribe to the channels below and press the button \
            under this message\\.",
            channels,
            GateCallback::CheckSponsors,
        ),
        Stage::Required => channels_prompt(
            "📌 *One more step*",
            "Subscribe to our channels below to get access to the bot\\.",
            channels,
            GateCallback::CheckRequired,
        ),
        Stage::Completed => anomaly_prompt(evaluation.error()),
    }
}

fn channels_prompt(
    title: &str,
    hint: &str,
    channels: &[CheckedChannel],
    check: GateCallback,
) -> StagePrompt {
    let lines = channels.iter().enumerate().map(|(i, checked)| {
        let number = i + 1;
        let name = markdown::escape(&checked.channel.name);
        let suffix = if checked.can_check {
            ""
        } else {
            " \\(can't verify automatically\\)"
        };
        format!("{number}\\. {name}{suffix}")
    });

    let message = format!(
        "{title}\n\n{hint}\n\n{}",
        lines.collect::<Vec<_>>().join("\n")
    );

    let mut buttons: Vec<_> = channels
        .iter()
        .filter_map(|checked| {
            let link = checked.channel.link.clone()?;
            Some(vec![PromptButton {
                text: format!("➕ {}", checked.channel.name),
                action: ButtonAction::Url(link),
            }])
        })
        .collect();

    buttons.push(vec![PromptButton {
        text: "✅ I've subscribed".to_owned(),
        action: ButtonAction::Callback(check),
    }]);

    StagePrompt { message, buttons }
}

fn completed_prompt() -> StagePrompt {
    StagePrompt {
        message: "🎉 *All set\\!*\n\nThanks for subscribing, the bot is now available to you\\."
            .to_owned(),
        buttons: vec![vec![PromptButton {
            text: "🏠 Main menu".to_owned(),
            action: ButtonAction::Callback(GateCallback::MainMenu),
        }]],
    }
}

fn gender_prompt() -> StagePrompt {
    let button = |text: &str, callback| PromptButton {
        text: text.to_owned(),
        action: ButtonAction::Callback(callback),
    };

    StagePrompt {
        message: "🤖 *One quick question*\n\nTo pick the right sponsor channels for you, \
            please tell us your gender\\."
            .to_owned(),
        buttons: vec![vec![
            button("👨 Male", GateCallback::SubgramGenderMale),
            button("👩 Female", GateCallback::SubgramGenderFemale),
        ]],
    }
}

/// Shown when the user is blocked but there is nothing to subscribe to.
fn anomaly_prompt(error: Option<&EvaluationError>) -> StagePrompt {
    let details = match error {
        Some(EvaluationError::ResolverFailure { error_id }) => format!(
            "We couldn't check your subscriptions right now\\. \
            Please try again in a minute\\.\n\nError id: {}",
            markdown::code_inline(error_id)
        ),
        Some(EvaluationError::NoChannelsConfigured) | None => {
            "The subscription check is temporarily unavailable\\. Please try again later\\."
                .to_owned()
        }
    };

    StagePrompt {
        message: format!("⚠️ *Something went wrong*\n\n{details}"),
        buttons: vec![vec![PromptButton {
            text: "🔄 Try again".to_owned(),
            action: ButtonAction::Callback(GateCallback::CheckRetry),
        }]],
    }
}

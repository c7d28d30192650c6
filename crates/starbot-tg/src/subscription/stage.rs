use super::CheckedChannel;

/// Stages are totally ordered, a user only ever sees the earliest stage
/// that still has unsubscribed channels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Stage {
    Sponsors,
    Required,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum NextAction {
    SubscribeSponsors,
    SubscribeRequired,
    ShowMainMenu,

    /// The sponsor provider needs the user's gender before it can pick
    /// sponsors for them.
    ChooseGender,
}

#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum EvaluationError {
    /// There are neither sponsor nor required channels, which is treated
    /// as a misconfiguration rather than a free pass.
    NoChannelsConfigured,

    /// The evaluation itself failed. The id references the logged error.
    ResolverFailure { error_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct StageStatus {
    pub(crate) subscribed_count: usize,
    pub(crate) total_count: usize,

    /// Vacuously `true` for an empty list of channels.
    pub(crate) all_subscribed: bool,
}

impl StageStatus {
    pub(crate) fn of(channels: &[CheckedChannel]) -> Self {
        let subscribed_count = channels.iter().filter(|channel| channel.subscribed).count();
        let total_count = channels.len();
        Self {
            subscribed_count,
            total_count,
            all_subscribed: subscribed_count == total_count,
        }
    }
}

/// Immutable outcome of resolving the gate stage for a single user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StageEvaluation {
    stage: Stage,
    sponsor_channels: Vec<CheckedChannel>,
    required_channels: Vec<CheckedChannel>,
    channels_to_show: Vec<CheckedChannel>,
    sponsor_status: StageStatus,
    required_status: StageStatus,
    all_completed: bool,
    next_action: NextAction,
    error: Option<EvaluationError>,
}

impl StageEvaluation {
    /// Sponsors are evaluated before required channels.
    pub(crate) fn from_checks(
        sponsor_channels: Vec<CheckedChannel>,
        required_channels: Vec<CheckedChannel>,
    ) -> Self {
        let sponsor_status = StageStatus::of(&sponsor_channels);
        let required_status = StageStatus::of(&required_channels);

        if sponsor_channels.is_empty() && required_channels.is_empty() {
            return Self {
                stage: Stage::Sponsors,
                sponsor_channels,
                required_channels,
                channels_to_show: vec![],
                sponsor_status,
                required_status,
                all_completed: false,
                next_action: NextAction::SubscribeSponsors,
                error: Some(EvaluationError::NoChannelsConfigured),
            };
        }

        let (stage, channels_to_show, next_action) = if !sponsor_status.all_subscribed {
            (
                Stage::Sponsors,
                unsubscribed(&sponsor_channels),
                NextAction::SubscribeSponsors,
            )
        } else if !required_status.all_subscribed {
            (
                Stage::Required,
                unsubscribed(&required_channels),
                NextAction::SubscribeRequired,
            )
        } else {
            (Stage::Completed, vec![], NextAction::ShowMainMenu)
        };

        Self {
            stage,
            sponsor_channels,
            required_channels,
            channels_to_show,
            sponsor_status,
            required_status,
            all_completed: stage == Stage::Completed,
            next_action,
            error: None,
        }
    }

    /// Fail-closed evaluation that keeps the user at the first stage.
    pub(crate) fn failed(error: EvaluationError) -> Self {
        Self::blocked(NextAction::SubscribeSponsors, Some(error))
    }

    /// The user stays at the sponsor stage until they tell their gender.
    pub(crate) fn awaiting_gender() -> Self {
        Self::blocked(NextAction::ChooseGender, None)
    }

    fn blocked(next_action: NextAction, error: Option<EvaluationError>) -> Self {
        Self {
            stage: Stage::Sponsors,
            sponsor_channels: vec![],
            required_channels: vec![],
            channels_to_show: vec![],
            sponsor_status: StageStatus::default(),
            required_status: StageStatus::default(),
            all_completed: false,
            next_action,
            error,
        }
    }

    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn sponsor_channels(&self) -> &[CheckedChannel] {
        &self.sponsor_channels
    }

    pub(crate) fn required_channels(&self) -> &[CheckedChannel] {
        &self.required_channels
    }

    pub(crate) fn channels_to_show(&self) -> &[CheckedChannel] {
        &self.channels_to_show
    }

    pub(crate) fn sponsor_status(&self) -> StageStatus {
        self.sponsor_status
    }

    pub(crate) fn required_status(&self) -> StageStatus {
        self.required_status
    }

    pub(crate) fn all_completed(&self) -> bool {
        self.all_completed
    }

    pub(crate) fn next_action(&self) -> NextAction {
        self.next_action
    }

    pub(crate) fn error(&self) -> Option<&EvaluationError> {
        self.error.as_ref()
    }
}

fn unsubscribed(channels: &[CheckedChannel]) -> Vec<CheckedChannel> {
    channels
        .iter()
        .filter(|channel| !channel.subscribed)
        .cloned()
        .collect()
}

use super::{
    CheckedChannel, EvaluationError, Gender, MembershipChecker, RequiredChannelRegistry,
    SponsorService, SponsorSource, StageEvaluation, UserLocks,
};
use crate::observability::metrics::GATE_EVALUATIONS;
use crate::prelude::*;
use crate::Result;
use itertools::Itertools;
use std::sync::Arc;
use teloxide::types::UserId;

/// Decides which gate stage a user is at.
pub(crate) struct StageResolver {
    sponsors: SponsorService,
    registry: Arc<dyn RequiredChannelRegistry>,
    membership: MembershipChecker,
    locks: UserLocks,
}

impl StageResolver {
    pub(crate) fn new(
        sponsors: SponsorService,
        registry: Arc<dyn RequiredChannelRegistry>,
        membership: MembershipChecker,
    ) -> Self {
        Self {
            sponsors,
            registry,
            membership,
            locks: UserLocks::default(),
        }
    }

    pub(crate) fn remember_gender(&self, user_id: UserId, gender: Gender) {
        self.sponsors.remember_gender(user_id, gender);
    }

    /// Never fails. Any error is turned into a fail-closed evaluation that
    /// keeps the user at the sponsor stage.
    #[instrument(skip(self))]
    pub(crate) async fn resolve_stage(&self, user_id: UserId) -> StageEvaluation {
        let _guard = self.locks.lock(user_id).await;

        let (result, duration) = self.try_resolve_stage(user_id).with_duration().await;

        let evaluation = result.unwrap_or_else(|err| {
            error!(
                err = tracing_err(&err),
                "Failed to resolve the gate stage, blocking access"
            );
            StageEvaluation::failed(EvaluationError::ResolverFailure {
                error_id: err.id().to_owned(),
            })
        });

        let stage: &'static str = evaluation.stage().into();
        let error: &'static str = evaluation.error().map(<&str>::from).unwrap_or("none");

        metrics::counter!(GATE_EVALUATIONS, "stage" => stage, "error" => error).increment(1);

        debug!(
            sponsors = ?channel_ids(evaluation.sponsor_channels()),
            required = ?channel_ids(evaluation.required_channels()),
            "Checked channels"
        );

        info!(
            stage,
            error,
            next_action = %evaluation.next_action(),
            sponsor_status = ?evaluation.sponsor_status(),
            required_status = ?evaluation.required_status(),
            channels_to_show = evaluation.channels_to_show().len(),
            duration = tracing_duration(duration),
            "Resolved gate stage"
        );

        evaluation
    }

    async fn try_resolve_stage(&self, user_id: UserId) -> Result<StageEvaluation> {
        let (sponsors, required) = futures::try_join!(
            self.sponsors.sponsor_channels(user_id),
            self.registry.list_active(),
        )?;

        if sponsors.source == SponsorSource::NeedsGender {
            return Ok(StageEvaluation::awaiting_gender());
        }

        let required: Vec<_> = required
            .into_iter()
            .unique_by(|channel| channel.id.clone())
            .collect();

        // A channel that is both a sponsor and a required one is checked
        // only once, as a required channel.
        let sponsor_channels: Vec<_> = sponsors
            .channels
            .into_iter()
            .filter(|sponsor| required.iter().all(|channel| channel.id != sponsor.id))
            .collect();

        let (sponsor_checks, required_checks) = futures::join!(
            self.membership.check_all(user_id, sponsor_channels),
            self.membership.check_all(user_id, required),
        );

        Ok(StageEvaluation::from_checks(sponsor_checks, required_checks))
    }
}

fn channel_ids(channels: &[CheckedChannel]) -> Vec<String> {
    channels
        .iter()
        .map(|checked| checked.channel.id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::testing::{channel, Harness};
    use crate::subscription::ChannelKind::{Required, Sponsor};
    use crate::subscription::{MembershipStatus, NextAction, SponsorOffer, Stage};

    #[test_log::test(tokio::test)]
    async fn sponsors_gate_before_required() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one", "sponsor_two"])
            .required(&["required_one"])
            .build();

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Sponsors);
        assert_eq!(evaluation.channels_to_show().len(), 2);
        assert!(evaluation
            .channels_to_show()
            .iter()
            .all(|c| c.channel.kind == Sponsor));
        assert_eq!(evaluation.required_status().total_count, 1);
    }

    #[test_log::test(tokio::test)]
    async fn user_progresses_through_stages() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one", "sponsor_two"])
            .required(&["required_one"])
            .build();

        harness.oracle.set_status("sponsor_one", MembershipStatus::Member);
        harness.oracle.set_status("sponsor_two", MembershipStatus::Member);

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;
        assert_eq!(evaluation.stage(), Stage::Required);
        assert_eq!(evaluation.channels_to_show()[0].channel.name, "required_one");

        harness.oracle.set_status("required_one", MembershipStatus::Administrator);

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;
        assert_eq!(evaluation.stage(), Stage::Completed);
        assert!(evaluation.all_completed());

        // Sponsors came from the cache on every evaluation after the first one
        assert_eq!(harness.provider.calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn sponsors_are_refetched_after_ttl() {
        let harness = Harness::builder().sponsors(&["sponsor_one"]).build();

        harness.resolver.resolve_stage(UserId(1)).await;
        harness.clock.advance(chrono::Duration::minutes(30));
        harness.resolver.resolve_stage(UserId(1)).await;
        assert_eq!(harness.provider.calls(), 1);

        harness.clock.advance(chrono::Duration::minutes(31));
        harness.resolver.resolve_stage(UserId(1)).await;
        assert_eq!(harness.provider.calls(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn unverifiable_sponsor_fails_open() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one"])
            .required(&["required_one"])
            .build();

        harness.oracle.set_failure("sponsor_one");

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Required);
        let sponsor = &evaluation.sponsor_channels()[0];
        assert!(sponsor.subscribed);
        assert!(!sponsor.can_check);
    }

    #[test_log::test(tokio::test)]
    async fn unverifiable_required_channel_fails_closed() {
        let harness = Harness::builder().required(&["required_one"]).build();

        harness.oracle.set_failure("required_one");

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Required);
        assert!(!evaluation.all_completed());
        assert!(!evaluation.channels_to_show()[0].can_check);
    }

    #[test_log::test(tokio::test)]
    async fn provider_outage_goes_straight_to_required() {
        let harness = Harness::builder()
            .provider_failure()
            .required(&["required_one"])
            .build();

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Required);
        assert!(evaluation.sponsor_channels().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn nothing_configured_is_an_error() {
        let harness = Harness::builder().provider_failure().build();

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Sponsors);
        assert!(!evaluation.all_completed());
        assert_eq!(
            evaluation.error(),
            Some(&EvaluationError::NoChannelsConfigured)
        );
    }

    #[test_log::test(tokio::test)]
    async fn exempt_user_skips_sponsors() {
        let harness = Harness::builder()
            .offer(SponsorOffer::Exempt)
            .required(&["required_one"])
            .build();

        harness.oracle.set_status("required_one", MembershipStatus::Member);

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;
        assert!(evaluation.all_completed());
    }

    #[test_log::test(tokio::test)]
    async fn exempt_user_without_required_channels_is_still_blocked() {
        let harness = Harness::builder().offer(SponsorOffer::Exempt).build();

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert!(!evaluation.all_completed());
        assert_eq!(
            evaluation.error(),
            Some(&EvaluationError::NoChannelsConfigured)
        );
    }

    #[test_log::test(tokio::test)]
    async fn gender_question_comes_before_required_channels() {
        let harness = Harness::builder()
            .offer(SponsorOffer::NeedsGender)
            .required(&["required_one"])
            .build();

        harness.oracle.set_status("required_one", MembershipStatus::Member);

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;
        assert_eq!(evaluation.next_action(), NextAction::ChooseGender);
        assert!(!evaluation.all_completed());

        harness.resolver.remember_gender(UserId(1), Gender::Male);

        // The fake provider keeps asking, the answer makes it count as no offers
        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;
        assert!(evaluation.all_completed());
        assert_eq!(harness.provider.requests()[1].gender, Some(Gender::Male));
    }

    #[test_log::test(tokio::test)]
    async fn registry_failure_blocks_access() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one"])
            .registry_failure()
            .build();

        harness.oracle.set_status("sponsor_one", MembershipStatus::Member);

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        assert_eq!(evaluation.stage(), Stage::Sponsors);
        assert!(!evaluation.all_completed());
        assert!(matches!(
            evaluation.error(),
            Some(EvaluationError::ResolverFailure { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn channel_in_both_lists_is_checked_as_required() {
        let harness = Harness::builder()
            .sponsors(&["shared_channel", "sponsor_one"])
            .required(&["shared_channel", "required_one"])
            .build();

        harness.oracle.set_status("sponsor_one", MembershipStatus::Member);
        harness.oracle.set_status("required_one", MembershipStatus::Member);
        harness.oracle.set_failure("shared_channel");

        let evaluation = harness.resolver.resolve_stage(UserId(1)).await;

        let sponsors = evaluation
            .sponsor_channels()
            .iter()
            .map(|c| c.channel.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sponsors, ["sponsor_one"]);

        assert_eq!(evaluation.stage(), Stage::Required);
        assert!(!evaluation.all_completed());

        let shown = &evaluation.channels_to_show()[0];
        assert_eq!(shown.channel.id, channel("shared_channel", Required).id);
        assert!(!shown.subscribed);
        assert!(!shown.can_check);
    }

    #[test_log::test(tokio::test)]
    async fn concurrent_evaluations_of_one_user_share_the_provider_request() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one"])
            .required(&["required_one"])
            .build();

        let user = UserId(1);
        let (first, second) = tokio::join!(
            harness.resolver.resolve_stage(user),
            harness.resolver.resolve_stage(user),
        );

        assert_eq!(first, second);
        assert_eq!(harness.provider.calls(), 1);
    }
}

use super::{format_stage, Gender, PromptButton, Stage, StagePrompt, StageResolver};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::types::UserId;

/// Persists the outcome of gate checks for later analysis.
#[async_trait]
pub(crate) trait GateStats: Send + Sync {
    async fn record_check(&self, user_id: UserId, passed: bool) -> Result;
}

/// What the chat layer needs to answer a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GateVerdict {
    pub(crate) stage: Stage,
    pub(crate) all_completed: bool,
    pub(crate) message: String,
    pub(crate) buttons: Vec<Vec<PromptButton>>,
}

/// Entry point into the gate for the chat layer.
pub(crate) struct SubscriptionGate {
    resolver: StageResolver,
    stats: Arc<dyn GateStats>,
}

impl SubscriptionGate {
    pub(crate) fn new(resolver: StageResolver, stats: Arc<dyn GateStats>) -> Self {
        Self { resolver, stats }
    }

    pub(crate) async fn check(&self, user_id: UserId, record_stats: bool) -> GateVerdict {
        let evaluation = self.resolver.resolve_stage(user_id).await;

        if record_stats {
            let passed = evaluation.all_completed();
            if let Err(err) = self.stats.record_check(user_id, passed).await {
                warn!(err = tracing_err(&err), "Failed to record the gate check");
            }
        }

        let StagePrompt { message, buttons } = format_stage(&evaluation);

        GateVerdict {
            stage: evaluation.stage(),
            all_completed: evaluation.all_completed(),
            message,
            buttons,
        }
    }

    /// Records the answer to the sponsor provider's question and evaluates
    /// the gate again with it.
    pub(crate) async fn choose_gender(&self, user_id: UserId, gender: Gender) -> GateVerdict {
        self.resolver.remember_gender(user_id, gender);
        self.check(user_id, false).await
    }

    /// Whether the user may use features behind the gate.
    pub(crate) async fn can_user_proceed(&self, user_id: UserId) -> bool {
        self.resolver.resolve_stage(user_id).await.all_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal;
    use crate::subscription::testing::Harness;
    use crate::subscription::{ButtonAction, GateCallback, MembershipStatus, SponsorOffer};
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct FakeStats {
        checks: SyncMutex<Vec<(UserId, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl GateStats for FakeStats {
        async fn record_check(&self, user_id: UserId, passed: bool) -> Result {
            if self.fail {
                return Err(fatal!("Database is down"));
            }
            self.checks.lock().push((user_id, passed));
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn blocked_user_gets_sponsor_prompt() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one"])
            .required(&["required_one"])
            .build();
        let stats = Arc::new(FakeStats::default());
        let gate = SubscriptionGate::new(harness.resolver, stats.clone());

        let verdict = gate.check(UserId(7), true).await;

        assert_eq!(verdict.stage, Stage::Sponsors);
        assert!(!verdict.all_completed);
        assert_eq!(
            verdict.buttons.last().unwrap()[0].action,
            ButtonAction::Callback(GateCallback::CheckSponsors)
        );
        assert_eq!(*stats.checks.lock(), [(UserId(7), false)]);
        assert!(!gate.can_user_proceed(UserId(7)).await);
    }

    #[test_log::test(tokio::test)]
    async fn subscribed_user_proceeds() {
        let harness = Harness::builder()
            .sponsors(&["sponsor_one"])
            .required(&["required_one"])
            .build();
        harness.oracle.set_status("sponsor_one", MembershipStatus::Member);
        harness.oracle.set_status("required_one", MembershipStatus::Creator);

        let stats = Arc::new(FakeStats::default());
        let gate = SubscriptionGate::new(harness.resolver, stats.clone());

        let verdict = gate.check(UserId(7), false).await;

        assert_eq!(verdict.stage, Stage::Completed);
        assert!(verdict.all_completed);
        assert!(stats.checks.lock().is_empty());
        assert!(gate.can_user_proceed(UserId(7)).await);
    }

    #[test_log::test(tokio::test)]
    async fn stats_failure_does_not_affect_verdict() {
        let harness = Harness::builder().required(&["required_one"]).build();
        harness.oracle.set_status("required_one", MembershipStatus::Member);

        let stats = Arc::new(FakeStats {
            fail: true,
            ..Default::default()
        });
        let gate = SubscriptionGate::new(harness.resolver, stats);

        assert!(gate.check(UserId(7), true).await.all_completed);
    }

    #[test_log::test(tokio::test)]
    async fn chosen_gender_is_sent_to_the_provider() {
        let harness = Harness::builder()
            .offer(SponsorOffer::NeedsGender)
            .required(&["required_one"])
            .build();
        let gate = SubscriptionGate::new(harness.resolver, Arc::new(FakeStats::default()));

        let verdict = gate.check(UserId(7), true).await;
        assert_eq!(verdict.stage, Stage::Sponsors);
        assert_eq!(
            verdict.buttons[0][0].action,
            ButtonAction::Callback(GateCallback::SubgramGenderMale)
        );

        let verdict = gate.choose_gender(UserId(7), Gender::Female).await;
        assert_eq!(verdict.stage, Stage::Required);
        assert_eq!(harness.provider.requests()[1].gender, Some(Gender::Female));
    }
}

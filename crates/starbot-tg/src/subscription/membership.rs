use super::{Channel, ChannelId, CheckedChannel};
use crate::observability::metrics::GATE_MEMBERSHIP_CHECKS;
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::UserId;

/// Membership of a user in a channel as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum MembershipStatus {
    Creator,
    Administrator,
    Member,

    /// Restricted, but still a member of the channel.
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    pub(crate) fn is_subscribed(self) -> bool {
        !matches!(self, Self::Left | Self::Kicked)
    }
}

/// Answers whether a user is a member of a channel. Fails when the bot has
/// no access to the channel, the channel doesn't exist or the platform is
/// unreachable.
#[async_trait]
pub(crate) trait MembershipOracle: Send + Sync {
    async fn membership(&self, channel: &ChannelId, user_id: UserId) -> Result<MembershipStatus>;
}

/// Applies the per-kind fail policy to membership checks and bounds each
/// of them with a timeout.
pub(crate) struct MembershipChecker {
    oracle: Arc<dyn MembershipOracle>,
    timeout: Duration,
}

impl MembershipChecker {
    pub(crate) fn new(oracle: Arc<dyn MembershipOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Checks all channels concurrently. The output preserves the order
    /// of the input.
    pub(crate) async fn check_all(
        &self,
        user_id: UserId,
        channels: Vec<Channel>,
    ) -> Vec<CheckedChannel> {
        let checks = channels
            .into_iter()
            .map(|channel| self.check(user_id, channel));

        futures::future::join_all(checks).await
    }

    #[instrument(skip_all, fields(channel = %channel.id, kind = %channel.kind))]
    async fn check(&self, user_id: UserId, channel: Channel) -> CheckedChannel {
        let unverifiable = channel.kind.subscribed_when_unverifiable();

        let (subscribed, can_check, outcome) = if !channel.id.is_checkable() {
            debug!("Channel is known only by an invite link, skipping the check");
            (unverifiable, false, "uncheckable")
        } else {
            let check = self.oracle.membership(&channel.id, user_id);

            match tokio::time::timeout(self.timeout, check).await {
                Ok(Ok(status)) => {
                    debug!(%status, "Checked channel membership");
                    let subscribed = status.is_subscribed();
                    let outcome = if subscribed {
                        "subscribed"
                    } else {
                        "not_subscribed"
                    };
                    (subscribed, true, outcome)
                }
                Ok(Err(err)) => {
                    warn!(
                        err = tracing_err(&err),
                        assumed_subscribed = unverifiable,
                        "Failed to check channel membership"
                    );
                    (unverifiable, false, "error")
                }
                Err(_) => {
                    warn!(
                        timeout = ?self.timeout,
                        assumed_subscribed = unverifiable,
                        "Channel membership check timed out"
                    );
                    (unverifiable, false, "timeout")
                }
            }
        };

        let kind: &'static str = channel.kind.into();
        metrics::counter!(GATE_MEMBERSHIP_CHECKS, "kind" => kind, "outcome" => outcome)
            .increment(1);

        CheckedChannel {
            channel,
            subscribed,
            can_check,
        }
    }
}

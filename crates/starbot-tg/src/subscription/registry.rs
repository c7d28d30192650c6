use super::Channel;
use crate::Result;
use async_trait::async_trait;

/// Operator-configured channels every user has to join after the sponsors.
#[async_trait]
pub(crate) trait RequiredChannelRegistry: Send + Sync {
    /// Active channels in a stable order, with channel kind set to
    /// [`ChannelKind::Required`](super::ChannelKind::Required).
    async fn list_active(&self) -> Result<Vec<Channel>>;
}

use super::{Channel, Clock};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::UserId;
use tokio::sync::oneshot;

/// Sponsor channels assigned to a user by the provider at `fetched_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SponsorChannelSet {
    pub(crate) channels: Vec<Channel>,
    pub(crate) fetched_at: DateTime<Utc>,
}

/// Per-user storage of sponsor channel sets. A set is stale once its
/// `fetched_at` is not after the cutoff passed by the caller.
#[async_trait]
pub(crate) trait SponsorCache: Send + Sync {
    /// Returns the set only if it was fetched strictly after `not_before`.
    async fn get(&self, user_id: UserId, not_before: DateTime<Utc>)
        -> Result<Option<SponsorChannelSet>>;

    /// Replaces the whole set of the user.
    async fn put(&self, user_id: UserId, set: SponsorChannelSet) -> Result;

    /// Removes every set fetched at or before `cutoff`, returns the number
    /// of removed entries.
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SponsorCacheKind {
    Postgres,
    Memory,
}

/// In-process cache. Entries are lost on restart, which only costs an
/// extra provider request per user.
#[derive(Default)]
pub(crate) struct MemorySponsorCache {
    sets: SyncMutex<HashMap<UserId, SponsorChannelSet>>,
}

#[async_trait]
impl SponsorCache for MemorySponsorCache {
    async fn get(
        &self,
        user_id: UserId,
        not_before: DateTime<Utc>,
    ) -> Result<Option<SponsorChannelSet>> {
        let sets = self.sets.lock();
        let set = sets
            .get(&user_id)
            .filter(|set| set.fetched_at > not_before)
            .cloned();
        Ok(set)
    }

    async fn put(&self, user_id: UserId, set: SponsorChannelSet) -> Result {
        self.sets.lock().insert(user_id, set);
        Ok(())
    }

    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|_, set| set.fetched_at > cutoff);
        Ok((before - sets.len()) as u64)
    }
}

/// Background task that periodically evicts stale sponsor sets so that
/// the cache doesn't grow with every user that ever started the bot.
pub(crate) struct CacheJanitor {
    cancel: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheJanitor {
    pub(crate) fn start(
        cache: Arc<dyn SponsorCache>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        interval: std::time::Duration,
    ) -> Self {
        let (cancel, mut cancelled) = oneshot::channel();

        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut cancelled => {
                        debug!("Sponsor cache janitor was stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let cutoff = clock.now() - ttl;

                match cache.evict_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(evicted) => info!(evicted, %cutoff, "Evicted stale sponsor channel sets"),
                    Err(err) => warn!(
                        err = tracing_err(&err),
                        "Failed to evict stale sponsor channel sets"
                    ),
                }
            }
        };

        let task = tokio::spawn(task.instrument(info_span!("sponsor_cache_janitor")));

        Self { cancel, task }
    }

    pub(crate) async fn stop(self) {
        if self.cancel.send(()).is_err() {
            warn!("Sponsor cache janitor has already finished");
        }
        if let Err(err) = self.task.await {
            warn!(err = tracing_err(&err), "Sponsor cache janitor panicked");
        }
    }
}

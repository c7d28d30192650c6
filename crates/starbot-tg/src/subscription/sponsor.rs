use super::{Channel, Clock, SponsorCache, SponsorChannelSet};
use crate::observability::metrics::{SPONSOR_CACHE_LOOKUPS, SPONSOR_PROVIDER_REQUESTS};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::{ChatId, UserId};

/// What the user is expected to do with the sponsor channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SponsorAction {
    Subscribe,
    Newtask,
}

/// Some advertisers target a specific audience, so the provider may ask for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SponsorRequest {
    pub(crate) user_id: UserId,

    /// Chat where the sponsors will be shown, the private chat with the user.
    pub(crate) chat_id: ChatId,
    pub(crate) max_offers: u8,
    pub(crate) action: SponsorAction,
    pub(crate) gender: Option<Gender>,
}

/// Interpreted answer of the sponsor provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SponsorOffer {
    /// Channels the user has to subscribe to.
    Channels(Vec<Channel>),

    /// The provider explicitly excused the user from the sponsor stage.
    Exempt,

    /// The provider has nothing to offer during this cycle.
    NoOffers,

    /// The provider wants to know the user's gender before offering anything.
    NeedsGender,
}

/// External service that assigns sponsor channels to users.
#[async_trait]
pub(crate) trait SponsorProvider: Send + Sync {
    async fn request_sponsors(&self, request: SponsorRequest) -> Result<SponsorOffer>;
}

#[derive(Debug, Clone)]
pub(crate) struct SponsorSettings {
    pub(crate) enabled: bool,
    pub(crate) max_offers: u8,
    pub(crate) action: SponsorAction,
    pub(crate) cache_ttl: chrono::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SponsorSource {
    Disabled,
    Cache,
    Provider,
    Exempt,
    NoOffers,
    NeedsGender,

    /// The provider failed, sponsors are skipped for this cycle.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SponsorChannels {
    pub(crate) channels: Vec<Channel>,
    pub(crate) source: SponsorSource,
}

impl SponsorChannels {
    fn empty(source: SponsorSource) -> Self {
        Self {
            channels: vec![],
            source,
        }
    }
}

/// Resolves sponsor channels of a user, preferring a fresh cached set over
/// a provider request. Provider failures never fail the evaluation.
pub(crate) struct SponsorService {
    provider: Arc<dyn SponsorProvider>,
    cache: Arc<dyn SponsorCache>,
    clock: Arc<dyn Clock>,
    settings: SponsorSettings,

    /// Answers to the provider's gender question. They only live as long
    /// as the process, the provider asks again after a restart.
    genders: SyncMutex<HashMap<UserId, Gender>>,
}

impl SponsorService {
    pub(crate) fn new(
        provider: Arc<dyn SponsorProvider>,
        cache: Arc<dyn SponsorCache>,
        clock: Arc<dyn Clock>,
        settings: SponsorSettings,
    ) -> Self {
        Self {
            provider,
            cache,
            clock,
            settings,
            genders: Default::default(),
        }
    }

    pub(crate) fn remember_gender(&self, user_id: UserId, gender: Gender) {
        info!(%gender, "Remembering the user's gender for sponsor requests");
        self.genders.lock().insert(user_id, gender);
    }

    #[instrument(skip(self))]
    pub(crate) async fn sponsor_channels(&self, user_id: UserId) -> Result<SponsorChannels> {
        if !self.settings.enabled {
            return Ok(SponsorChannels::empty(SponsorSource::Disabled));
        }

        let now = self.clock.now();

        let cached = self.cache.get(user_id, now - self.settings.cache_ttl).await?;

        let lookup = if cached.is_some() { "hit" } else { "miss" };
        metrics::counter!(SPONSOR_CACHE_LOOKUPS, "outcome" => lookup).increment(1);

        if let Some(set) = cached {
            debug!(fetched_at = %set.fetched_at, "Using cached sponsor channels");
            return Ok(SponsorChannels {
                channels: dedup(set.channels),
                source: SponsorSource::Cache,
            });
        }

        let request = SponsorRequest {
            user_id,
            chat_id: user_id.into(),
            max_offers: self.settings.max_offers,
            action: self.settings.action,
            gender: self.genders.lock().get(&user_id).copied(),
        };
        let gender = request.gender;

        let offer = match self.provider.request_sponsors(request).await {
            Ok(offer) => offer,
            Err(err) => {
                warn!(
                    err = tracing_err(&err),
                    "Sponsor provider is unavailable, skipping sponsors"
                );
                return Ok(self.observe(SponsorChannels::empty(SponsorSource::Unavailable)));
            }
        };

        let channels = match offer {
            SponsorOffer::Exempt => {
                return Ok(self.observe(SponsorChannels::empty(SponsorSource::Exempt)))
            }
            SponsorOffer::NoOffers => {
                return Ok(self.observe(SponsorChannels::empty(SponsorSource::NoOffers)))
            }
            // Asking again after an answer would lock the user out
            SponsorOffer::NeedsGender if gender.is_some() => {
                warn!(?gender, "Sponsor provider asked for the gender again");
                return Ok(self.observe(SponsorChannels::empty(SponsorSource::NoOffers)));
            }
            SponsorOffer::NeedsGender => {
                return Ok(self.observe(SponsorChannels::empty(SponsorSource::NeedsGender)))
            }
            SponsorOffer::Channels(channels) => dedup(channels),
        };

        if channels.is_empty() {
            return Ok(self.observe(SponsorChannels::empty(SponsorSource::NoOffers)));
        }

        let set = SponsorChannelSet {
            channels: channels.clone(),
            fetched_at: now,
        };

        // The user still has to pass the gate even if caching failed
        if let Err(err) = self.cache.put(user_id, set).await {
            warn!(err = tracing_err(&err), "Failed to cache sponsor channels");
        }

        Ok(self.observe(SponsorChannels {
            channels,
            source: SponsorSource::Provider,
        }))
    }

    fn observe(&self, channels: SponsorChannels) -> SponsorChannels {
        let source: &'static str = channels.source.into();
        metrics::counter!(SPONSOR_PROVIDER_REQUESTS, "outcome" => source).increment(1);
        info!(
            source = %channels.source,
            channels = channels.channels.len(),
            "Requested sponsor channels"
        );
        channels
    }
}

fn dedup(channels: Vec<Channel>) -> Vec<Channel> {
    channels
        .into_iter()
        .unique_by(|channel| channel.id.clone())
        .collect()
}

//! Fakes and fixtures shared by the tests of the gate.

use super::{
    Channel, ChannelId, ChannelKind, CheckedChannel, Clock, MembershipChecker, MembershipOracle,
    MembershipStatus, MemorySponsorCache, RequiredChannelRegistry, SponsorAction, SponsorOffer,
    SponsorProvider, SponsorRequest, SponsorService, SponsorSettings, StageResolver,
};
use crate::{fatal, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::UserId;

pub(crate) fn channel(name: &str, kind: ChannelKind) -> Channel {
    let id = ChannelId::parse(name).unwrap();
    Channel::new(id, Some(name.to_owned()), kind)
}

pub(crate) fn checked(name: &str, kind: ChannelKind, subscribed: bool) -> CheckedChannel {
    CheckedChannel {
        channel: channel(name, kind),
        subscribed,
        can_check: true,
    }
}

pub(crate) fn checked_unverifiable(name: &str, kind: ChannelKind) -> CheckedChannel {
    CheckedChannel {
        channel: channel(name, kind),
        subscribed: kind.subscribed_when_unverifiable(),
        can_check: false,
    }
}

pub(crate) struct ManualClock {
    now: SyncMutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: SyncMutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub(crate) fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[derive(Clone, Copy)]
enum FakeMembership {
    Status(MembershipStatus),
    Failure,
    Hang,
}

/// Channels without a configured membership report [`MembershipStatus::Left`].
#[derive(Clone, Default)]
pub(crate) struct FakeOracle {
    memberships: Arc<SyncMutex<HashMap<ChannelId, FakeMembership>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeOracle {
    fn set(&self, name: &str, membership: FakeMembership) {
        let id = ChannelId::parse(name).unwrap();
        self.memberships.lock().insert(id, membership);
    }

    pub(crate) fn with_status(self, name: &str, status: MembershipStatus) -> Self {
        self.set_status(name, status);
        self
    }

    pub(crate) fn with_failure(self, name: &str) -> Self {
        self.set_failure(name);
        self
    }

    pub(crate) fn with_hang(self, name: &str) -> Self {
        self.set(name, FakeMembership::Hang);
        self
    }

    pub(crate) fn set_status(&self, name: &str, status: MembershipStatus) {
        self.set(name, FakeMembership::Status(status));
    }

    pub(crate) fn set_failure(&self, name: &str) {
        self.set(name, FakeMembership::Failure);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipOracle for FakeOracle {
    async fn membership(&self, channel: &ChannelId, _: UserId) -> Result<MembershipStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let membership = self.memberships.lock().get(channel).copied();

        match membership {
            None => Ok(MembershipStatus::Left),
            Some(FakeMembership::Status(status)) => Ok(status),
            Some(FakeMembership::Failure) => Err(fatal!("Bot is not an admin of {channel}")),
            Some(FakeMembership::Hang) => futures::future::pending().await,
        }
    }
}

/// Answers [`SponsorOffer::NoOffers`] unless configured otherwise.
#[derive(Default)]
pub(crate) struct FakeProvider {
    offer: Option<SponsorOffer>,
    fail: bool,
    calls: AtomicUsize,
    requests: SyncMutex<Vec<SponsorRequest>>,
}

impl FakeProvider {
    pub(crate) fn with_offer(mut self, offer: SponsorOffer) -> Self {
        self.offer = Some(offer);
        self
    }

    pub(crate) fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<SponsorRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SponsorProvider for FakeProvider {
    async fn request_sponsors(&self, request: SponsorRequest) -> Result<SponsorOffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        if self.fail {
            return Err(fatal!("Sponsor provider is down"));
        }

        Ok(self.offer.clone().unwrap_or(SponsorOffer::NoOffers))
    }
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    channels: Vec<Channel>,
    fail: bool,
}

#[async_trait]
impl RequiredChannelRegistry for FakeRegistry {
    async fn list_active(&self) -> Result<Vec<Channel>> {
        if self.fail {
            return Err(fatal!("Database is down"));
        }
        Ok(self.channels.clone())
    }
}

pub(crate) struct Harness {
    pub(crate) resolver: StageResolver,
    pub(crate) oracle: FakeOracle,
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) clock: Arc<ManualClock>,
}

#[derive(Default)]
pub(crate) struct HarnessBuilder {
    provider: FakeProvider,
    registry: FakeRegistry,
}

impl Harness {
    pub(crate) fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

impl HarnessBuilder {
    pub(crate) fn sponsors(self, names: &[&str]) -> Self {
        let channels = names
            .iter()
            .map(|name| channel(name, ChannelKind::Sponsor))
            .collect();
        self.offer(SponsorOffer::Channels(channels))
    }

    pub(crate) fn offer(mut self, offer: SponsorOffer) -> Self {
        self.provider = self.provider.with_offer(offer);
        self
    }

    pub(crate) fn provider_failure(mut self) -> Self {
        self.provider = self.provider.with_failure();
        self
    }

    pub(crate) fn required(mut self, names: &[&str]) -> Self {
        self.registry.channels = names
            .iter()
            .map(|name| channel(name, ChannelKind::Required))
            .collect();
        self
    }

    pub(crate) fn registry_failure(mut self) -> Self {
        self.registry.fail = true;
        self
    }

    pub(crate) fn build(self) -> Harness {
        let oracle = FakeOracle::default();
        let provider = Arc::new(self.provider);
        let clock = Arc::new(ManualClock::default());

        let settings = SponsorSettings {
            enabled: true,
            max_offers: 3,
            action: SponsorAction::Subscribe,
            cache_ttl: chrono::Duration::hours(1),
        };

        let sponsors = SponsorService::new(
            provider.clone(),
            Arc::new(MemorySponsorCache::default()),
            clock.clone(),
            settings,
        );

        let membership = MembershipChecker::new(Arc::new(oracle.clone()), Duration::from_secs(5));

        let resolver = StageResolver::new(sponsors, Arc::new(self.registry), membership);

        Harness {
            resolver,
            oracle,
            provider,
            clock,
        }
    }
}

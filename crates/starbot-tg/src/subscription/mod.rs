//! Subscription gate: decides whether a user has subscribed to the sponsor
//! and required channels and what to show them next.

mod cache;
mod channel;
mod clock;
mod formatter;
mod gate;
mod locks;
mod membership;
mod registry;
mod resolver;
mod sponsor;
mod stage;

#[cfg(test)]
mod testing;

pub(crate) use cache::*;
pub(crate) use channel::*;
pub(crate) use clock::*;
pub(crate) use formatter::*;
pub(crate) use gate::*;
pub(crate) use locks::*;
pub(crate) use membership::*;
pub(crate) use registry::*;
pub(crate) use resolver::*;
pub(crate) use sponsor::*;
pub(crate) use stage::*;

use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_membership_check_timeout_secs")]
    membership_check_timeout_secs: u64,

    #[serde(default = "default_sponsor_cache_ttl_secs")]
    sponsor_cache_ttl_secs: u64,

    #[serde(default = "default_sponsor_cache")]
    pub(crate) sponsor_cache: SponsorCacheKind,

    #[serde(default = "default_cache_janitor_interval_secs")]
    cache_janitor_interval_secs: u64,
}

fn default_membership_check_timeout_secs() -> u64 {
    5
}

fn default_sponsor_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_sponsor_cache() -> SponsorCacheKind {
    SponsorCacheKind::Postgres
}

fn default_cache_janitor_interval_secs() -> u64 {
    10 * 60
}

impl Config {
    pub(crate) fn membership_check_timeout(&self) -> Duration {
        Duration::from_secs(self.membership_check_timeout_secs)
    }

    pub(crate) fn sponsor_cache_ttl(&self) -> chrono::Duration {
        let secs = u32::try_from(self.sponsor_cache_ttl_secs).unwrap_or(u32::MAX);
        chrono::Duration::seconds(secs.into())
    }

    pub(crate) fn cache_janitor_interval(&self) -> Duration {
        Duration::from_secs(self.cache_janitor_interval_secs.max(1))
    }
}

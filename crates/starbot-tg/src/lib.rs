mod config;
mod db;
mod error;
mod http;
mod observability;
mod subgram;
mod subscription;
mod tg;
mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

use std::sync::Arc;
use subscription::{
    CacheJanitor, Clock, MembershipChecker, MemorySponsorCache, SponsorCache, SponsorCacheKind,
    SponsorService, SponsorSettings, StageResolver, SubscriptionGate, SystemClock,
};

/// Run the telegram bot processing loop
pub async fn run(config: Config) -> Result<()> {
    let db = db::init(config.db).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sponsor_cache: Arc<dyn SponsorCache> = match config.gate.sponsor_cache {
        SponsorCacheKind::Postgres => db.sponsor_channels.clone(),
        SponsorCacheKind::Memory => Arc::new(MemorySponsorCache::default()),
    };

    let sponsor_settings = SponsorSettings {
        enabled: config.subgram.enabled,
        max_offers: config.subgram.max_sponsors(),
        action: config.subgram.action,
        cache_ttl: config.gate.sponsor_cache_ttl(),
    };

    let provider = Arc::new(subgram::SubgramClient::new(
        config.subgram,
        http::create_client(),
    ));

    let sponsors = SponsorService::new(
        provider,
        sponsor_cache.clone(),
        clock.clone(),
        sponsor_settings,
    );

    let bot = tg::create_bot(&config.tg);

    let membership = MembershipChecker::new(
        Arc::new(tg::TgMembershipOracle::new(bot.clone())),
        config.gate.membership_check_timeout(),
    );

    let resolver = StageResolver::new(sponsors, db.required_channels.clone(), membership);
    let gate = SubscriptionGate::new(resolver, db.subscription_checks.clone());

    let janitor = CacheJanitor::start(
        sponsor_cache,
        clock,
        config.gate.sponsor_cache_ttl(),
        config.gate.cache_janitor_interval(),
    );

    let result = tg::run_bot(bot, gate).await;

    janitor.stop().await;

    result
}

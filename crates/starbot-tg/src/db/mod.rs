mod conv;
mod required_channels;
mod sponsor_channels;
mod subscription_checks;

use crate::{err_ctx, Result};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

pub(crate) use required_channels::*;
pub(crate) use sponsor_channels::*;
pub(crate) use subscription_checks::*;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    10
}

/// Most likely unrecoverable errors from database communication layer
#[derive(Debug, thiserror::Error)]
pub(crate) enum DbError {
    #[error("Failed to connect to the database")]
    Connect { source: sqlx::Error },

    #[error("Failed to migrate the database")]
    Migrate { source: sqlx::migrate::MigrateError },

    #[error("Database query failed")]
    Query {
        #[from]
        source: sqlx::Error,
    },

    #[error("Failed to convert {app_ty} into {db_ty}")]
    Serialize {
        app_ty: &'static str,
        db_ty: &'static str,
        source: Box<crate::util::DynError>,
    },
}

pub(crate) struct Repo {
    pub(crate) required_channels: Arc<RequiredChannelsRepo>,
    pub(crate) sponsor_channels: Arc<SponsorChannelsRepo>,
    pub(crate) subscription_checks: Arc<SubscriptionChecksRepo>,
}

pub(crate) async fn init(config: Config) -> Result<Repo> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        // Verify that the connection is working early.
        // The connection created here can also be reused by the migrations down the road.
        .connect(config.url.as_str())
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    Ok(Repo {
        required_channels: Arc::new(RequiredChannelsRepo::new(pool.clone())),
        sponsor_channels: Arc::new(SponsorChannelsRepo::new(pool.clone())),
        subscription_checks: Arc::new(SubscriptionChecksRepo::new(pool)),
    })
}

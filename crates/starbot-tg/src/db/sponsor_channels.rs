use super::conv::user_id_into_db;
use crate::prelude::*;
use crate::subscription::{Channel, ChannelId, ChannelKind, SponsorCache, SponsorChannelSet};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Iden, Order, PostgresQueryBuilder, Query, SimpleExpr};
use sea_query_binder::SqlxBinder;
use teloxide::types::UserId;
use url::Url;

#[derive(Iden)]
enum SubgramChannels {
    Table,
    UserId,
    Position,
    ChannelId,
    ChannelLink,
    ChannelName,
    FetchedAt,
}

#[derive(Debug, sqlx::FromRow)]
struct SponsorChannelRecord {
    channel_id: String,
    channel_link: Option<String>,
    channel_name: String,
    fetched_at: DateTime<Utc>,
}

impl SponsorChannelRecord {
    fn into_channel(self) -> Option<Channel> {
        let id = match ChannelId::parse(&self.channel_id) {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    channel_id = %self.channel_id,
                    err = tracing_err(&err),
                    "Skipping cached sponsor channel with invalid id"
                );
                return None;
            }
        };
        let link = self.channel_link.and_then(|link| Url::parse(&link).ok());
        let channel = Channel::new(id, Some(self.channel_name), ChannelKind::Sponsor);
        Some(channel.with_link(link))
    }
}

/// Rows of one user form one set, they are always replaced together.
fn into_set(records: Vec<SponsorChannelRecord>) -> Option<SponsorChannelSet> {
    let fetched_at = records.iter().map(|record| record.fetched_at).max()?;

    let channels: Vec<_> = records
        .into_iter()
        .filter_map(SponsorChannelRecord::into_channel)
        .collect();

    if channels.is_empty() {
        return None;
    }

    Some(SponsorChannelSet {
        channels,
        fetched_at,
    })
}

/// Postgres-backed [`SponsorCache`]. Survives restarts and is shared
/// between bot replicas.
pub(crate) struct SponsorChannelsRepo {
    db: sqlx::PgPool,
}

impl SponsorChannelsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SponsorCache for SponsorChannelsRepo {
    #[instrument(skip(self))]
    async fn get(
        &self,
        user_id: UserId,
        not_before: DateTime<Utc>,
    ) -> Result<Option<SponsorChannelSet>> {
        let (sql, values) = Query::select()
            .columns([
                SubgramChannels::ChannelId,
                SubgramChannels::ChannelLink,
                SubgramChannels::ChannelName,
                SubgramChannels::FetchedAt,
            ])
            .from(SubgramChannels::Table)
            .and_where(Expr::col(SubgramChannels::UserId).eq(user_id_into_db(user_id)?))
            .and_where(Expr::col(SubgramChannels::FetchedAt).gt(not_before))
            .order_by(SubgramChannels::Position, Order::Asc)
            .build_sqlx(PostgresQueryBuilder);

        let records: Vec<SponsorChannelRecord> = sqlx::query_as_with(&sql, values)
            .fetch_all(&self.db)
            .await?;

        Ok(into_set(records))
    }

    #[instrument(skip(self, set), fields(channels = set.channels.len()))]
    async fn put(&self, user_id: UserId, set: SponsorChannelSet) -> Result {
        let user_id = user_id_into_db(user_id)?;

        let mut tx = self.db.begin().await?;

        let (sql, values) = Query::delete()
            .from_table(SubgramChannels::Table)
            .and_where(Expr::col(SubgramChannels::UserId).eq(user_id))
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *tx).await?;

        if !set.channels.is_empty() {
            let mut insert = Query::insert();

            insert.into_table(SubgramChannels::Table).columns([
                SubgramChannels::UserId,
                SubgramChannels::Position,
                SubgramChannels::ChannelId,
                SubgramChannels::ChannelLink,
                SubgramChannels::ChannelName,
                SubgramChannels::FetchedAt,
            ]);

            for (position, channel) in (0_i32..).zip(&set.channels) {
                let values: [SimpleExpr; 6] = [
                    user_id.into(),
                    position.into(),
                    channel.id.to_string().into(),
                    channel.link.as_ref().map(ToString::to_string).into(),
                    channel.name.clone().into(),
                    set.fetched_at.into(),
                ];
                insert.values_panic(values);
            }

            let (sql, values) = insert.build_sqlx(PostgresQueryBuilder);

            sqlx::query_with(&sql, values).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let (sql, values) = Query::delete()
            .from_table(SubgramChannels::Table)
            .and_where(Expr::col(SubgramChannels::FetchedAt).lte(cutoff))
            .build_sqlx(PostgresQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.db).await?;

        Ok(result.rows_affected())
    }
}

use crate::prelude::*;
use crate::subscription::{Channel, ChannelId, ChannelKind, RequiredChannelRegistry};
use crate::Result;
use async_trait::async_trait;
use sea_query::{Expr, Iden, Order, PostgresQueryBuilder, Query, SelectStatement};
use sea_query_binder::SqlxBinder;
use url::Url;

#[derive(Iden)]
enum RequiredChannels {
    Table,
    Id,
    ChannelId,
    ChannelName,
    InviteLink,
    IsActive,
}

#[derive(Debug, sqlx::FromRow)]
struct RequiredChannelRecord {
    channel_id: String,
    channel_name: Option<String>,
    invite_link: Option<String>,
}

impl RequiredChannelRecord {
    /// Rows with an unparseable channel id are skipped, a single typo in the
    /// table must not lock every user out.
    fn into_channel(self) -> Option<Channel> {
        let id = match ChannelId::parse(&self.channel_id) {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    channel_id = %self.channel_id,
                    err = tracing_err(&err),
                    "Skipping required channel with invalid id"
                );
                return None;
            }
        };

        let invite_link = self.invite_link.and_then(|link| match Url::parse(&link) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(%link, err = tracing_err(&err), "Ignoring invalid invite link");
                None
            }
        });

        let channel = Channel::new(id, self.channel_name, ChannelKind::Required);

        Some(channel.with_link(invite_link))
    }
}

fn list_active_query() -> SelectStatement {
    Query::select()
        .columns([
            RequiredChannels::ChannelId,
            RequiredChannels::ChannelName,
            RequiredChannels::InviteLink,
        ])
        .from(RequiredChannels::Table)
        .and_where(Expr::col(RequiredChannels::IsActive).eq(true))
        .order_by(RequiredChannels::Id, Order::Asc)
        .to_owned()
}

pub(crate) struct RequiredChannelsRepo {
    db: sqlx::PgPool,
}

impl RequiredChannelsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RequiredChannelRegistry for RequiredChannelsRepo {
    #[instrument(skip_all)]
    async fn list_active(&self) -> Result<Vec<Channel>> {
        let (sql, values) = list_active_query().build_sqlx(PostgresQueryBuilder);

        let records: Vec<RequiredChannelRecord> = sqlx::query_as_with(&sql, values)
            .fetch_all(&self.db)
            .await?;

        Ok(records
            .into_iter()
            .filter_map(RequiredChannelRecord::into_channel)
            .collect())
    }
}

use super::conv::user_id_into_db;
use crate::prelude::*;
use crate::subscription::GateStats;
use crate::Result;
use async_trait::async_trait;
use sea_query::{Iden, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use teloxide::types::UserId;

#[derive(Iden)]
enum SubscriptionChecks {
    Table,
    UserId,
    Passed,
}

pub(crate) struct SubscriptionChecksRepo {
    db: sqlx::PgPool,
}

impl SubscriptionChecksRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GateStats for SubscriptionChecksRepo {
    #[instrument(skip(self))]
    async fn record_check(&self, user_id: UserId, passed: bool) -> Result {
        let (sql, values) = Query::insert()
            .into_table(SubscriptionChecks::Table)
            .columns([SubscriptionChecks::UserId, SubscriptionChecks::Passed])
            .values_panic([user_id_into_db(user_id)?.into(), passed.into()])
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.db).await?;

        Ok(())
    }
}

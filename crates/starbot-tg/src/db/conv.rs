use super::DbError;
use crate::util::DynError;
use crate::{err_ctx, Result};
use teloxide::types::UserId;

fn try_into_db<App, Db>(app_val: App) -> Result<Db>
where
    App: TryInto<Db>,
    App::Error: Into<Box<DynError>>,
{
    app_val.try_into().map_err(err_ctx!(DbError::Serialize {
        app_ty: std::any::type_name::<App>(),
        db_ty: std::any::type_name::<Db>()
    }))
}

/// Telegram user ids fit into 52 bits, so they are stored as `bigint`.
pub(crate) fn user_id_into_db(user_id: UserId) -> Result<i64> {
    try_into_db(user_id.0)
}

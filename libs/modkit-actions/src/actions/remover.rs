//! `remove`: existence check, then delete by key.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use sea_orm::sea_query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ActionContext, EntityAction, to_json};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::query::key_where;
use crate::record::{Record, has_all, sub_record};
use crate::runner::{Runner, TxScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResult {
    pub num_removed: u64,
}

#[derive(Clone, Debug)]
pub struct Remover {
    ctx: ActionContext,
}

impl Remover {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    async fn write(&self, runner: Runner<'_>, where_args: &Record) -> Result<RemoveResult, ActionError> {
        let d = &self.ctx.descriptor;
        if !self.ctx.key_exists(runner, where_args).await? {
            return Err(ActionError::Conflict(format!("{} does not exist", d.label())));
        }
        let mut stmt = Query::delete();
        stmt.from_table(d.table_ref()).cond_where(key_where(where_args));
        let res = runner.execute(&stmt).await.map_err(|e| {
            ActionError::from_write(
                e,
                || format!("{} is still referenced", d.label()),
                || format!("Could not remove {}", d.noun()),
            )
        })?;
        Ok(RemoveResult {
            num_removed: res.rows_affected(),
        })
    }

    /// Delete the row identified by the key columns of `args`.
    ///
    /// # Errors
    /// `UnprocessableEntity` when a key column is missing, `Conflict` when no
    /// row matches, `Server` on store failures.
    #[tracing::instrument(
        name = "remove",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name())
    )]
    pub async fn remove(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<RemoveResult, ActionError> {
        let d = &self.ctx.descriptor;
        if !has_all(args, d.keys()) {
            return Err(ActionError::UnprocessableEntity(format!(
                "Missing key to remove {}: {}",
                d.noun(),
                d.keys().join(", ")
            )));
        }
        let where_args = sub_record(args, d.keys(), &Record::new());
        let where_args = self.ctx.record_hook(HookSlot::OnWillRemove, where_args, args)?;

        let scope = TxScope::begin(&self.ctx.conn, tx).await?;
        let result = self.write(scope.runner(), &where_args).await;
        let removed = scope.finish(result).await?;
        tracing::debug!(num_removed = removed.num_removed, "removed");
        self.ctx.typed_hook(HookSlot::OnRemoveResult, removed, args)
    }
}

#[async_trait]
impl EntityAction for Remover {
    fn name(&self) -> &str {
        "remove"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        to_json(self.remove(&args, tx).await?)
    }
}

//! `create`: insert one row and return its fresh projection.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use serde_json::Value;

use super::{ActionContext, EntityAction, insert_rows};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::record::{Record, sub_record};
use crate::runner::{Runner, TxScope};

#[derive(Clone, Debug)]
pub struct Creator {
    ctx: ActionContext,
}

impl Creator {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    async fn write(&self, runner: Runner<'_>, values: Record) -> Result<Option<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        let keys = insert_rows(runner, d, std::slice::from_ref(&values), false)
            .await
            .map_err(|e| {
                ActionError::from_write(e, || self.ctx.conflict_message(), || format!("Could not create {}", d.noun()))
            })?;
        match keys.first() {
            Some(keys) => Ok(self.ctx.select_by_keys(runner, keys).await?),
            None => Ok(None),
        }
    }

    /// Insert the `createColumns` of `args` (filled from the configured
    /// defaults) and return the stored row.
    ///
    /// # Errors
    /// `Conflict` on a duplicate key or unique tuple, `Server` on any other
    /// store failure. An owned transaction is rolled back first.
    #[tracing::instrument(
        name = "create",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name())
    )]
    pub async fn create(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<Option<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        let values = sub_record(args, d.create_columns(), d.default_create_args());
        let values = self.ctx.record_hook(HookSlot::OnWillCreate, values, args)?;
        tracing::debug!(values = %self.ctx.loggable(&values), "creating");

        let scope = TxScope::begin(&self.ctx.conn, tx).await?;
        let result = self.write(scope.runner(), values).await;
        let row = scope.finish(result).await?;
        self.ctx.optional_record_hook(HookSlot::OnCreateResult, row, args)
    }
}

#[async_trait]
impl EntityAction for Creator {
    fn name(&self) -> &str {
        "create"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        Ok(self.create(&args, tx).await?.map_or(Value::Null, Value::Object))
    }
}

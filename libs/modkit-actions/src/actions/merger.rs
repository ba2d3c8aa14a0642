//! `merge`: single-record upsert keyed on the entity key.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use serde_json::Value;

use super::{ActionContext, EntityAction, insert_rows};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::record::{Record, sub_record};
use crate::runner::{Runner, TxScope};

#[derive(Clone, Debug)]
pub struct Merger {
    ctx: ActionContext,
}

impl Merger {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    fn merge_columns(&self) -> Vec<String> {
        let d = &self.ctx.descriptor;
        let mut cols = d.keys().to_vec();
        cols.extend(d.create_columns().iter().filter(|c| !d.keys().contains(c)).cloned());
        cols
    }

    async fn write(&self, runner: Runner<'_>, values: Record) -> Result<Option<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        let keys = insert_rows(runner, d, std::slice::from_ref(&values), true)
            .await
            .map_err(|e| {
                ActionError::from_write(e, || self.ctx.conflict_message(), || format!("Could not save {}", d.noun()))
            })?;
        let keys = keys
            .into_iter()
            .next()
            .unwrap_or_else(|| sub_record(&values, d.keys(), &Record::new()));
        Ok(self.ctx.select_by_keys(runner, &keys).await?)
    }

    /// Insert `args`, or overwrite the non-key columns of the row sharing its key.
    ///
    /// # Errors
    /// `Conflict` when another unique constraint is violated, `Server` on any
    /// other store failure.
    #[tracing::instrument(
        name = "merge",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name())
    )]
    pub async fn merge(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<Option<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        let values = sub_record(args, &self.merge_columns(), d.default_create_args());
        let values = self.ctx.record_hook(HookSlot::OnWillCreate, values, args)?;

        let scope = TxScope::begin(&self.ctx.conn, tx).await?;
        let result = self.write(scope.runner(), values).await;
        let row = scope.finish(result).await?;
        self.ctx.optional_record_hook(HookSlot::OnCreateResult, row, args)
    }
}

#[async_trait]
impl EntityAction for Merger {
    fn name(&self) -> &str {
        "merge"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        Ok(self.merge(&args, tx).await?.map_or(Value::Null, Value::Object))
    }
}

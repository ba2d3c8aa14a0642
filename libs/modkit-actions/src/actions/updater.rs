//! `update` and its soft-remove flavors.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use sea_orm::sea_query::{Alias, Query};
use serde_json::Value;

use super::{ActionContext, EntityAction};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::query::key_where;
use crate::record::{Record, has_all, sql_expr, sub_record};
use crate::runner::{Runner, TxScope};

/// What an [`Updater`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// The `updateColumns` present in args, filled from the configured defaults.
    Update,
    /// Sets the soft-remove column to `true`.
    SoftRemove,
    /// Sets the soft-remove column to `false`.
    SoftRestore,
}

impl UpdateMode {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::SoftRemove => "softRemove",
            Self::SoftRestore => "softRestore",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Updater {
    ctx: ActionContext,
    mode: UpdateMode,
}

/// Write one record's values to the row matched by its key, bare columns only.
pub(crate) async fn update_row(runner: Runner<'_>, ctx: &ActionContext, where_args: &Record, values: &Record) -> Result<u64, ActionError> {
    if values.is_empty() {
        return Ok(0);
    }
    let d = &ctx.descriptor;
    let mut stmt = Query::update();
    stmt.table(d.table_ref())
        .values(values.iter().map(|(col, v)| (Alias::new(col), sql_expr(v))))
        .cond_where(key_where(where_args));
    let res = runner
        .execute(&stmt)
        .await
        .map_err(|e| ActionError::from_write(e, || ctx.conflict_message(), || format!("Could not update {}", d.noun())))?;
    Ok(res.rows_affected())
}

impl Updater {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self::with_mode(ctx, UpdateMode::Update)
    }

    #[must_use]
    pub fn with_mode(ctx: ActionContext, mode: UpdateMode) -> Self {
        Self { ctx, mode }
    }

    #[must_use]
    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    fn values(&self, args: &Record) -> Result<Record, ActionError> {
        let d = &self.ctx.descriptor;
        match self.mode {
            UpdateMode::Update => {
                let values = sub_record(args, d.update_columns(), d.default_update_args());
                self.ctx.record_hook(HookSlot::OnWillUpdate, values, args)
            }
            UpdateMode::SoftRemove | UpdateMode::SoftRestore => {
                let mut values = Record::new();
                values.insert(
                    d.soft_remove_column().to_owned(),
                    Value::Bool(self.mode == UpdateMode::SoftRemove),
                );
                Ok(values)
            }
        }
    }

    async fn write(&self, runner: Runner<'_>, where_args: &Record, values: &Record) -> Result<Option<Record>, ActionError> {
        update_row(runner, &self.ctx, where_args, values).await?;
        Ok(self.ctx.select_by_keys(runner, where_args).await?)
    }

    /// Update the row identified by the key columns of `args` and return it.
    ///
    /// Returns `None` without writing when a key column is missing, and
    /// `None` when no row matches.
    ///
    /// # Errors
    /// `Conflict` when the new values duplicate a unique tuple, `Server` on
    /// any other store failure.
    #[tracing::instrument(
        name = "update",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name(), mode = self.mode.name())
    )]
    pub async fn update(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<Option<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        if !has_all(args, d.keys()) {
            tracing::debug!(args = %self.ctx.loggable(args), "update without a complete key");
            return Ok(None);
        }
        let where_args = sub_record(args, d.keys(), &Record::new());
        let values = self.values(args)?;

        let scope = TxScope::begin(&self.ctx.conn, tx).await?;
        let result = self.write(scope.runner(), &where_args, &values).await;
        let row = scope.finish(result).await?;
        self.ctx.optional_record_hook(HookSlot::OnUpdateResult, row, args)
    }
}

#[async_trait]
impl EntityAction for Updater {
    fn name(&self) -> &str {
        self.mode.name()
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        Ok(self.update(&args, tx).await?.map_or(Value::Null, Value::Object))
    }
}

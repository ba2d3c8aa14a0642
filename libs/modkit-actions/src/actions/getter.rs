//! `get` and `is`: single-record lookup by key or by an alternate unique tuple.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use sea_orm::sea_query::{Condition, Expr};
use serde_json::Value;

use super::{ActionContext, EntityAction};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::record::{Record, has_all, sql_value};
use crate::runner::Runner;

#[derive(Clone, Debug)]
pub struct Getter {
    ctx: ActionContext,
}

impl Getter {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    /// Lookup predicate for `args`, or `None` when neither a key column nor a
    /// complete unique tuple is present.
    ///
    /// Key columns present in `args` are matched directly; each complete
    /// unique tuple adds its own ANDed clause.
    pub(crate) fn lookup(&self, args: &Record) -> Option<Condition> {
        let d = &self.ctx.descriptor;
        let primary = d.entity_name();
        let mut cond = Condition::all();
        let mut constrained = false;

        for key in d.keys() {
            if let Some(v) = args.get(key).filter(|v| !v.is_null()) {
                let col = crate::alias::QualifiedColumn::new(primary, key);
                cond = cond.add(Expr::expr(col.expr()).eq(sql_value(v)));
                constrained = true;
            }
        }
        for tuple in d.unique_columns() {
            if !has_all(args, tuple) {
                continue;
            }
            let clause = tuple.iter().fold(Condition::all(), |c, name| {
                let col = d.aliases().resolve(name, primary);
                c.add(Expr::expr(col.expr()).eq(sql_value(&args[name])))
            });
            cond = cond.add(clause);
            constrained = true;
        }
        constrained.then_some(cond)
    }

    pub(crate) async fn fetch(&self, runner: Runner<'_>, args: &Record) -> Result<Option<Record>, ActionError> {
        let Some(filter) = self.lookup(args) else {
            return Ok(None);
        };
        let stmt = crate::query::assemble(&self.ctx.descriptor, filter);
        Ok(runner.fetch_one(&stmt).await?)
    }

    /// The row matching `args`, or `None`.
    ///
    /// # Errors
    /// Store failures and malformed `OnGetResult` hook output.
    #[tracing::instrument(
        name = "get",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name())
    )]
    pub async fn get(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<Option<Record>, ActionError> {
        let row = self.fetch(self.ctx.runner(tx), args).await?;
        self.ctx.optional_record_hook(HookSlot::OnGetResult, row, args)
    }

    /// Whether a row matching `args` exists.
    ///
    /// # Errors
    /// Same as [`Getter::get`].
    pub async fn is(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<bool, ActionError> {
        Ok(self.get(args, tx).await?.is_some())
    }
}

#[async_trait]
impl EntityAction for Getter {
    fn name(&self) -> &str {
        "get"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        Ok(self.get(&args, tx).await?.map_or(Value::Null, Value::Object))
    }
}

/// `is`: the getter reduced to an existence flag.
#[derive(Clone, Debug)]
pub struct Existence(pub Getter);

#[async_trait]
impl EntityAction for Existence {
    fn name(&self) -> &str {
        "is"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        Ok(Value::Bool(self.0.is(&args, tx).await?))
    }
}

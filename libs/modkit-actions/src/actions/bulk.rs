//! Bulk family: set-oriented writes over an explicit record list, each run in
//! one transaction.

use async_trait::async_trait;
use heck::ToTitleCase;
use sea_orm::DatabaseTransaction;
use sea_orm::sea_query::{Condition, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::updater::update_row;
use super::{ActionContext, EntityAction, insert_rows, to_json};
use crate::error::ActionError;
use crate::hooks::HookSlot;
use crate::query::{ColumnStyle, assemble, bulk_where, key_where};
use crate::record::{Record, has_all, sub_record};
use crate::runner::{Runner, TxScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkKind {
    Create,
    Update,
    Remove,
    Merge,
    Put,
}

impl BulkKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "bulkCreate",
            Self::Update => "bulkUpdate",
            Self::Remove => "bulkRemove",
            Self::Merge => "bulkMerge",
            Self::Put => "bulkPut",
        }
    }

    fn hook(self) -> Option<HookSlot> {
        match self {
            Self::Create => Some(HookSlot::OnWillBulkCreate),
            Self::Update => Some(HookSlot::OnWillBulkUpdate),
            Self::Merge => Some(HookSlot::OnWillBulkMerge),
            Self::Remove | Self::Put => None,
        }
    }
}

/// Outcome of a bulk call. Fields a given action does not report are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_put: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_removed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Record>>,
}

impl BulkSummary {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Nothing to do: the record list was empty or absent.
    #[must_use]
    pub fn no_records(records_key: &str) -> Self {
        Self {
            success: false,
            key: Some("no_records".to_owned()),
            reason: Some(format!("No records passed to \"{records_key}\"")),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_result(mut self, rows: Vec<Record>) -> Self {
        self.inserts = Some(rows.len() as u64);
        self.result = Some(rows);
        self
    }
}

/// Split `records` into runs sharing one column list, keeping first-seen order.
fn group_by_columns(records: Vec<Record>) -> Vec<Vec<Record>> {
    let mut groups: Vec<(Vec<String>, Vec<Record>)> = Vec::new();
    for record in records {
        let signature: Vec<String> = record.keys().cloned().collect();
        match groups.iter_mut().find(|(sig, _)| *sig == signature) {
            Some((_, rows)) => rows.push(record),
            None => groups.push((signature, vec![record])),
        }
    }
    groups.into_iter().map(|(_, rows)| rows).collect()
}

#[derive(Clone, Debug)]
pub struct BulkAction {
    ctx: ActionContext,
    kind: BulkKind,
}

impl BulkAction {
    #[must_use]
    pub fn new(ctx: ActionContext, kind: BulkKind) -> Self {
        Self { ctx, kind }
    }

    #[must_use]
    pub fn kind(&self) -> BulkKind {
        self.kind
    }

    /// The record list under the descriptor's records key.
    ///
    /// # Errors
    /// `UnprocessableEntity` when the list is not an array of objects.
    pub fn records(&self, args: &Record) -> Result<Vec<Record>, ActionError> {
        let key = self.ctx.descriptor.records_key();
        let items = match args.get(key) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ActionError::UnprocessableEntity(format!("\"{key}\" must be a list of records")));
            }
        };
        items
            .iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record.clone()),
                _ => Err(ActionError::UnprocessableEntity(format!(
                    "Every entry of \"{key}\" must be a record"
                ))),
            })
            .collect()
    }

    /// Every record must carry the same value as `args` for each configured
    /// match key that `args` sets.
    ///
    /// # Errors
    /// `UnprocessableEntity` naming the keys when a record disagrees.
    pub fn check_match(&self, args: &Record, records: &[Record]) -> Result<(), ActionError> {
        let d = &self.ctx.descriptor;
        let must_match = sub_record(args, d.arg_keys_must_match(), &Record::new());
        if must_match.is_empty() {
            return Ok(());
        }
        let agrees = |record: &Record| must_match.iter().all(|(k, v)| record.get(k) == Some(v));
        if records.iter().all(agrees) {
            return Ok(());
        }
        let keys: Vec<String> = d.arg_keys_must_match().iter().map(|k| k.to_title_case()).collect();
        Err(ActionError::UnprocessableEntity(format!(
            "All {} records must match on the {} keys",
            d.noun(),
            keys.join(" ")
        )))
    }

    /// `bulkPut` deletes within the scope named by the match keys, so each of
    /// them must be set.
    ///
    /// # Errors
    /// `UnprocessableEntity` naming the missing keys.
    pub fn check_scope(&self, args: &Record) -> Result<(), ActionError> {
        let d = &self.ctx.descriptor;
        let missing: Vec<String> = d
            .arg_keys_must_match()
            .iter()
            .filter(|k| args.get(*k).is_none_or(Value::is_null))
            .map(|k| k.to_title_case())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ActionError::UnprocessableEntity(format!(
            "Replacing {} records needs the {} keys",
            d.noun(),
            missing.join(" ")
        )))
    }

    fn transform(&self, records: Vec<Record>, args: &Record) -> Result<Vec<Record>, ActionError> {
        let Some(slot) = self.kind.hook().filter(|slot| self.ctx.hooks.has(*slot)) else {
            return Ok(records);
        };
        let items = records.into_iter().map(Value::Object).collect();
        match self.ctx.hooks.apply(slot, Value::Array(items), args) {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(self.ctx.bad_hook(slot, &other)),
                })
                .collect(),
            other => Err(self.ctx.bad_hook(slot, &other)),
        }
    }

    /// Columns a record may write: the key plus `createColumns`, with defaults.
    fn insert_values(&self, record: &Record) -> Record {
        let d = &self.ctx.descriptor;
        let mut cols = d.keys().to_vec();
        cols.extend(d.create_columns().iter().filter(|c| !d.keys().contains(c)).cloned());
        sub_record(record, &cols, d.default_create_args())
    }

    fn write_error(&self, err: sea_orm::DbErr) -> ActionError {
        let d = &self.ctx.descriptor;
        ActionError::from_write(err, || self.ctx.conflict_message(), || {
            format!("Could not {} {} records", self.kind.name(), d.noun())
        })
    }

    async fn reselect(&self, runner: Runner<'_>, keyed: &[Record]) -> Result<Vec<Record>, ActionError> {
        let d = &self.ctx.descriptor;
        let filter = bulk_where(keyed, d.keys(), ColumnStyle::Qualified(d.aliases(), d.entity_name()), false);
        Ok(runner.fetch_all(&assemble(d, filter)).await?)
    }

    async fn insert_all(&self, runner: Runner<'_>, records: &[Record], upsert: bool) -> Result<Vec<Record>, ActionError> {
        let values: Vec<Record> = records.iter().map(|r| self.insert_values(r)).collect();
        let mut keys = Vec::with_capacity(values.len());
        for group in group_by_columns(values) {
            let inserted = insert_rows(runner, &self.ctx.descriptor, &group, upsert)
                .await
                .map_err(|e| self.write_error(e))?;
            keys.extend(inserted);
        }
        Ok(keys)
    }

    async fn create(&self, runner: Runner<'_>, records: &[Record], return_results: bool) -> Result<BulkSummary, ActionError> {
        let keys = self.insert_all(runner, records, false).await?;
        let summary = if return_results {
            BulkSummary::succeeded().with_result(self.reselect(runner, &keys).await?)
        } else {
            BulkSummary::succeeded()
        };
        // every record was written, whether or not the reselect can find it
        Ok(BulkSummary {
            inserts: Some(records.len() as u64),
            ..summary
        })
    }

    async fn update(&self, runner: Runner<'_>, records: &[Record], return_results: bool) -> Result<BulkSummary, ActionError> {
        let d = &self.ctx.descriptor;
        for record in records {
            let where_args = sub_record(record, d.keys(), &Record::new());
            let values = sub_record(record, d.update_columns(), d.default_update_args());
            update_row(runner, &self.ctx, &where_args, &values).await?;
        }
        if return_results {
            return Ok(BulkSummary::succeeded().with_result(self.reselect(runner, records).await?));
        }
        Ok(BulkSummary::succeeded())
    }

    async fn remove(&self, runner: Runner<'_>, records: &[Record]) -> Result<BulkSummary, ActionError> {
        let d = &self.ctx.descriptor;
        let mut stmt = Query::delete();
        stmt.from_table(d.table_ref())
            .cond_where(bulk_where(records, d.keys(), ColumnStyle::Bare, false));
        let res = runner.execute(&stmt).await.map_err(|e| self.write_error(e))?;
        Ok(BulkSummary {
            num_removed: Some(res.rows_affected()),
            ..BulkSummary::succeeded()
        })
    }

    async fn merge(&self, runner: Runner<'_>, records: &[Record], return_results: bool) -> Result<BulkSummary, ActionError> {
        self.insert_all(runner, records, true).await?;
        if return_results {
            return Ok(BulkSummary::succeeded().with_result(self.reselect(runner, records).await?));
        }
        Ok(BulkSummary::succeeded())
    }

    /// Delete what is in scope but absent from `records`, then upsert `records`.
    async fn put(&self, runner: Runner<'_>, args: &Record, records: &[Record]) -> Result<BulkSummary, ActionError> {
        let d = &self.ctx.descriptor;
        let scope = sub_record(args, d.arg_keys_must_match(), &Record::new());
        let filter = Condition::all()
            .add(key_where(&scope))
            .add(bulk_where(records, d.keys(), ColumnStyle::Bare, true));
        let mut stmt = Query::delete();
        stmt.from_table(d.table_ref()).cond_where(filter);
        let removed = runner.execute(&stmt).await.map_err(|e| self.write_error(e))?;

        self.insert_all(runner, records, true).await?;
        Ok(BulkSummary {
            num_put: Some(records.len() as u64),
            num_removed: Some(removed.rows_affected()),
            ..BulkSummary::succeeded()
        })
    }

    async fn dispatch(&self, runner: Runner<'_>, args: &Record, records: &[Record]) -> Result<BulkSummary, ActionError> {
        let return_results = args.get("returnResults").and_then(Value::as_bool).unwrap_or(false);
        match self.kind {
            BulkKind::Create => self.create(runner, records, return_results).await,
            BulkKind::Update => self.update(runner, records, return_results).await,
            BulkKind::Remove => self.remove(runner, records).await,
            BulkKind::Merge => self.merge(runner, records, return_results).await,
            BulkKind::Put => self.put(runner, args, records).await,
        }
    }

    /// Run the bulk operation over the records of `args`.
    ///
    /// Nothing is persisted unless every statement succeeds. With an outer
    /// `tx` the statements join it and the caller decides.
    ///
    /// # Errors
    /// `UnprocessableEntity` for a malformed record list, records disagreeing
    /// on the match keys, a `bulkPut` without its match keys, or records
    /// without a key where one is needed;
    /// `Conflict` and `Server` for failed writes.
    #[tracing::instrument(
        name = "bulk",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name(), action = self.kind.name())
    )]
    pub async fn run(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<BulkSummary, ActionError> {
        let d = &self.ctx.descriptor;
        let records = self.records(args)?;
        if records.is_empty() {
            return Ok(BulkSummary::no_records(d.records_key()));
        }
        self.check_match(args, &records)?;
        if self.kind == BulkKind::Put {
            self.check_scope(args)?;
        }
        let records = self.transform(records, args)?;
        let needs_keys = matches!(self.kind, BulkKind::Update | BulkKind::Remove | BulkKind::Put);
        if needs_keys && !records.iter().all(|r| has_all(r, d.keys())) {
            return Err(ActionError::UnprocessableEntity(format!(
                "Every {} record needs {}",
                d.noun(),
                d.keys().join(", ")
            )));
        }
        tracing::debug!(records = records.len(), "bulk write");

        let scope = TxScope::begin(&self.ctx.conn, tx).await?;
        let result = self.dispatch(scope.runner(), args, &records).await;
        scope.finish(result).await
    }
}

#[async_trait]
impl EntityAction for BulkAction {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        to_json(self.run(&args, tx).await?)
    }
}

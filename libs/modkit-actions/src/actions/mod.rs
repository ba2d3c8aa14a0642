//! Action factories. Each one captures an [`ActionContext`] and exposes one
//! async operation; all of them share the alias map, joins and query assembly
//! of the entity's descriptor.

pub mod bulk;
pub mod creator;
pub mod getter;
pub mod iterate;
pub mod lister;
pub mod merger;
pub mod remover;
pub mod updater;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, InsertStatement, OnConflict, Query};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr};
use serde_json::Value;

use crate::config::ActionsConfig;
use crate::descriptor::EntityDescriptor;
use crate::error::ActionError;
use crate::hooks::{HookRegistry, HookSlot};
use crate::record::{Record, sql_expr, sub_record};
use crate::runner::Runner;

/// Everything an action needs, shared cheaply between actions of one entity.
#[derive(Clone, Debug)]
pub struct ActionContext {
    pub(crate) descriptor: Arc<EntityDescriptor>,
    pub(crate) conn: DatabaseConnection,
    pub(crate) hooks: Arc<HookRegistry>,
    pub(crate) config: Arc<ActionsConfig>,
}

impl ActionContext {
    #[must_use]
    pub fn new(descriptor: Arc<EntityDescriptor>, conn: DatabaseConnection) -> Self {
        Self {
            descriptor,
            conn,
            hooks: Arc::new(HookRegistry::default()),
            config: Arc::new(ActionsConfig::default()),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ActionsConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub(crate) fn runner<'a>(&'a self, tx: Option<&'a DatabaseTransaction>) -> Runner<'a> {
        Runner::new(&self.conn, tx)
    }

    /// Args as they may appear in logs.
    pub(crate) fn loggable(&self, args: &Record) -> Value {
        Value::Object(crate::record::redacted(args, self.descriptor.redacted_columns()))
    }

    /// Run a record through `slot`; the hooks must hand back a record.
    pub(crate) fn record_hook(
        &self,
        slot: HookSlot,
        record: Record,
        args: &Record,
    ) -> Result<Record, ActionError> {
        if !self.hooks.has(slot) {
            return Ok(record);
        }
        match self.hooks.apply(slot, Value::Object(record), args) {
            Value::Object(map) => Ok(map),
            other => Err(self.bad_hook(slot, &other)),
        }
    }

    /// Run an optional record through `slot`; `null` stands for "no record".
    pub(crate) fn optional_record_hook(
        &self,
        slot: HookSlot,
        record: Option<Record>,
        args: &Record,
    ) -> Result<Option<Record>, ActionError> {
        if !self.hooks.has(slot) {
            return Ok(record);
        }
        let value = record.map_or(Value::Null, Value::Object);
        match self.hooks.apply(slot, value, args) {
            Value::Object(map) => Ok(Some(map)),
            Value::Null => Ok(None),
            other => Err(self.bad_hook(slot, &other)),
        }
    }

    /// Run any serializable result through `slot` and decode it back.
    pub(crate) fn typed_hook<T>(&self, slot: HookSlot, result: T, args: &Record) -> Result<T, ActionError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if !self.hooks.has(slot) {
            return Ok(result);
        }
        let value = serde_json::to_value(result).map_err(|e| self.bad_hook(slot, &e))?;
        let value = self.hooks.apply(slot, value, args);
        serde_json::from_value(value).map_err(|e| self.bad_hook(slot, &e))
    }

    /// Re-select the projection of the row identified by `keys`.
    pub(crate) async fn select_by_keys(&self, runner: Runner<'_>, keys: &Record) -> Result<Option<Record>, DbErr> {
        let d = &self.descriptor;
        if !crate::record::has_all(keys, d.keys()) {
            return Ok(None);
        }
        let filter = crate::query::primary_where(&sub_record(keys, d.keys(), &Record::new()), d.entity_name());
        runner.fetch_one(&crate::query::assemble(d, filter)).await
    }

    /// Whether the primary table holds a row with these key values. Joins are
    /// not applied, so a dangling reference does not hide the row.
    pub(crate) async fn key_exists(&self, runner: Runner<'_>, where_args: &Record) -> Result<bool, DbErr> {
        let d = &self.descriptor;
        let mut stmt = Query::select();
        stmt.columns(d.keys().iter().map(Alias::new))
            .from(d.table_ref())
            .cond_where(crate::query::key_where(where_args));
        Ok(runner.fetch_one(&stmt).await?.is_some())
    }

    pub(crate) fn conflict_message(&self) -> String {
        format!("{} already exists", self.descriptor.label())
    }

    fn bad_hook(&self, slot: HookSlot, detail: &dyn std::fmt::Display) -> ActionError {
        tracing::error!(
            entity = %self.descriptor.entity_name(),
            slot = ?slot,
            %detail,
            "hook produced a value of the wrong shape"
        );
        ActionError::Server(format!("Could not process {}", self.descriptor.noun()))
    }
}

/// Uniform, dynamically callable form of every action, keyed in the model's action map.
#[async_trait]
pub trait EntityAction: Send + Sync {
    /// Bare action name, e.g. `get` or `bulkPut`.
    fn name(&self) -> &str;

    /// Run with JSON args; `tx` joins an outer transaction.
    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError>;
}

pub(crate) fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|e| ActionError::Server(e.to_string()))
}

/// Key values after an insert: returned rows first, then the inserted values,
/// then the store's last insert id for single-key entities.
fn inserted_keys(d: &EntityDescriptor, values: &Record, last_insert_id: Option<u64>) -> Option<Record> {
    let keys = d.keys();
    if crate::record::has_all(values, keys) {
        return Some(sub_record(values, keys, &Record::new()));
    }
    match (keys, last_insert_id) {
        ([key], Some(id)) if id != 0 => {
            let mut out = Record::new();
            out.insert(key.clone(), Value::from(id));
            Some(out)
        }
        _ => None,
    }
}

pub(crate) fn on_conflict_merge<'a>(d: &EntityDescriptor, columns: impl Iterator<Item = &'a String>) -> OnConflict {
    let keys = d.keys();
    let merged: Vec<Alias> = columns.filter(|c| !keys.contains(c)).map(Alias::new).collect();
    let mut clause = OnConflict::columns(keys.iter().map(Alias::new));
    if merged.is_empty() {
        clause.do_nothing();
    } else {
        clause.update_columns(merged);
    }
    clause
}

fn insert_statement(d: &EntityDescriptor, rows: &[Record], upsert: bool) -> Result<Option<InsertStatement>, DbErr> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let mut stmt = Query::insert();
    stmt.into_table(d.table_ref());
    if first.is_empty() {
        stmt.or_default_values();
    } else {
        stmt.columns(first.keys().map(Alias::new));
        for row in rows {
            stmt.values(first.keys().map(|k| row.get(k).map_or_else(|| sql_expr(&Value::Null), sql_expr)))
                .map_err(|e| DbErr::Custom(e.to_string()))?;
        }
    }
    if upsert {
        stmt.on_conflict(on_conflict_merge(d, first.keys()));
    }
    Ok(Some(stmt))
}

/// Insert `values` as rows sharing one column list; returns the key values of each row
/// the store reports, or of the input rows when the backend cannot return them.
///
/// Without RETURNING, rows whose key is assigned by the store are written one
/// statement each so every `last_insert_id` is seen.
pub(crate) async fn insert_rows(
    runner: Runner<'_>,
    d: &EntityDescriptor,
    rows: &[Record],
    upsert: bool,
) -> Result<Vec<Record>, DbErr> {
    let Some(mut stmt) = insert_statement(d, rows, upsert)? else {
        return Ok(Vec::new());
    };

    if runner.supports_returning() {
        stmt.returning(Query::returning().columns(d.keys().iter().map(Alias::new)));
        let returned = runner.insert_returning(&stmt).await?;
        if returned.len() == rows.len() {
            return Ok(returned);
        }
        // upserts that did nothing return fewer rows
        return Ok(rows.iter().filter_map(|r| inserted_keys(d, r, None)).collect());
    }

    let keyed = rows.iter().all(|r| crate::record::has_all(r, d.keys()));
    if keyed || rows.len() == 1 {
        let res = runner.execute(&stmt).await?;
        let last_id = (rows.len() == 1).then(|| res.last_insert_id());
        return Ok(rows.iter().filter_map(|r| inserted_keys(d, r, last_id)).collect());
    }

    let mut keys = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(single) = insert_statement(d, std::slice::from_ref(row), upsert)? {
            let res = runner.execute(&single).await?;
            keys.extend(inserted_keys(d, row, Some(res.last_insert_id())));
        }
    }
    Ok(keys)
}

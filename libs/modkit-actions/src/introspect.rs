//! Entity Introspector: physical column metadata read from the store.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseTransaction, QueryResult, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{ActionContext, EntityAction, to_json};
use crate::descriptor::check_ident;
use crate::error::ActionError;
use crate::record::Record;

/// Store types folded into the few kinds callers validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Int,
    Number,
    Boolean,
    Date,
    Json,
    Other,
}

impl ColumnKind {
    /// Classify a declared store type such as `character varying(64)` or `BIGINT`.
    #[must_use]
    pub fn from_store_type(data_type: &str) -> Self {
        let t = data_type.to_ascii_lowercase();
        let base = t.split('(').next().unwrap_or_default().trim();
        if base.contains("json") {
            Self::Json
        } else if base.contains("bool") {
            Self::Boolean
        } else if base.contains("interval") {
            Self::Other
        } else if base.contains("int") || base.contains("serial") {
            Self::Int
        } else if ["char", "text", "clob", "uuid", "enum"].iter().any(|s| base.contains(s)) {
            Self::String
        } else if ["real", "double", "float", "numeric", "decimal"].iter().any(|s| base.contains(s)) {
            Self::Number
        } else if base.contains("date") || base.contains("time") {
            Self::Date
        } else {
            Self::Other
        }
    }
}

/// Declared length of `varchar(255)`-style types.
fn declared_length(data_type: &str) -> Option<u64> {
    let (_, rest) = data_type.split_once('(')?;
    rest.split([')', ',']).next()?.trim().parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// The store fills the column when it is omitted.
    pub has_default: bool,
    pub max_length: Option<u64>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key columns in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn sqlite_column(row: &QueryResult) -> Result<ColumnInfo, sea_orm::DbErr> {
    let data_type: String = row.try_get("", "type")?;
    let not_null: i32 = row.try_get("", "notnull")?;
    let default: Option<String> = row.try_get("", "dflt_value")?;
    let pk: i32 = row.try_get("", "pk")?;
    let kind = ColumnKind::from_store_type(&data_type);
    Ok(ColumnInfo {
        name: row.try_get("", "name")?,
        max_length: declared_length(&data_type),
        // INTEGER PRIMARY KEY aliases the rowid and is assigned on insert
        has_default: default.is_some() || (pk > 0 && data_type.eq_ignore_ascii_case("integer")),
        nullable: not_null == 0 && pk == 0,
        primary_key: pk > 0,
        data_type,
        kind,
    })
}

fn catalog_column(row: &QueryResult) -> Result<ColumnInfo, sea_orm::DbErr> {
    let data_type: String = row.try_get("", "data_type")?;
    let nullable: String = row.try_get("", "is_nullable")?;
    let default: Option<String> = row.try_get("", "column_default")?;
    let max_length: Option<i64> = row.try_get("", "max_length")?;
    let primary_key: i64 = row.try_get("", "is_pk")?;
    Ok(ColumnInfo {
        name: row.try_get("", "column_name")?,
        kind: ColumnKind::from_store_type(&data_type),
        nullable: nullable.eq_ignore_ascii_case("yes"),
        has_default: default.is_some(),
        max_length: max_length.and_then(|l| u64::try_from(l).ok()),
        primary_key: primary_key > 0,
        data_type,
    })
}

const POSTGRES_COLUMNS: &str = r"
SELECT c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       c.is_nullable::text AS is_nullable,
       c.column_default::text AS column_default,
       c.character_maximum_length::bigint AS max_length,
       (SELECT COUNT(*) FROM information_schema.table_constraints tc
          JOIN information_schema.key_column_usage k
            ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema
         WHERE tc.constraint_type = 'PRIMARY KEY'
           AND tc.table_schema = c.table_schema AND tc.table_name = c.table_name
           AND k.column_name = c.column_name) AS is_pk
  FROM information_schema.columns c
 WHERE c.table_schema = $1 AND c.table_name = $2
 ORDER BY c.ordinal_position";

const MYSQL_COLUMNS: &str = r"
SELECT COLUMN_NAME AS column_name,
       DATA_TYPE AS data_type,
       IS_NULLABLE AS is_nullable,
       COALESCE(COLUMN_DEFAULT, IF(EXTRA LIKE '%auto_increment%', 'auto_increment', NULL)) AS column_default,
       CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
       CAST(COLUMN_KEY = 'PRI' AS SIGNED) AS is_pk
  FROM information_schema.COLUMNS
 WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
 ORDER BY ORDINAL_POSITION";

/// Read the columns of `schema.table`.
///
/// # Errors
/// `InvalidDescriptor` for names that are not plain identifiers or a table
/// with no visible columns; store failures.
#[tracing::instrument(skip(conn))]
pub async fn introspect_table<C>(conn: &C, schema: Option<&str>, table: &str) -> Result<TableInfo, ActionError>
where
    C: ConnectionTrait,
{
    check_ident("table", table)?;
    if let Some(schema) = schema {
        check_ident("schema", schema)?;
    }
    let backend = conn.get_database_backend();
    let columns = match backend {
        DatabaseBackend::Sqlite => {
            let pragma = match schema {
                Some(schema) => format!("PRAGMA \"{schema}\".table_info(\"{table}\")"),
                None => format!("PRAGMA table_info(\"{table}\")"),
            };
            let rows = conn.query_all(Statement::from_string(backend, pragma)).await?;
            rows.iter().map(sqlite_column).collect::<Result<Vec<_>, _>>()?
        }
        DatabaseBackend::Postgres => {
            let stmt = Statement::from_sql_and_values(
                backend,
                POSTGRES_COLUMNS,
                [schema.unwrap_or("public").into(), table.into()],
            );
            let rows = conn.query_all(stmt).await?;
            rows.iter().map(catalog_column).collect::<Result<Vec<_>, _>>()?
        }
        DatabaseBackend::MySql => {
            let stmt = Statement::from_sql_and_values(
                backend,
                MYSQL_COLUMNS,
                [schema.map(str::to_owned).into(), table.into()],
            );
            let rows = conn.query_all(stmt).await?;
            rows.iter().map(catalog_column).collect::<Result<Vec<_>, _>>()?
        }
    };
    if columns.is_empty() {
        return Err(ActionError::InvalidDescriptor(format!("table {table} has no visible columns")));
    }
    tracing::debug!(columns = columns.len(), "introspected");
    Ok(TableInfo {
        schema: schema.map(str::to_owned),
        table: table.to_owned(),
        columns,
    })
}

/// What the routing layer learns about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Introspection {
    pub entity_name: String,
    pub schema: Option<String>,
    pub pascal_name: String,
    pub label: String,
    pub keys: Vec<String>,
    pub select_args: Vec<String>,
    pub create_columns: Vec<String>,
    pub update_columns: Vec<String>,
    pub uses_joins: bool,
    pub joins: Vec<String>,
    pub joined_entities: Vec<String>,
    pub columns: Vec<ColumnInfo>,
}

/// `introspect`: descriptor metadata plus live column info for the columns it uses.
#[derive(Clone, Debug)]
pub struct Introspector {
    ctx: ActionContext,
}

impl Introspector {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    /// # Errors
    /// Store failures while reading column metadata.
    pub async fn describe(&self, tx: Option<&DatabaseTransaction>) -> Result<Introspection, ActionError> {
        let d = &self.ctx.descriptor;
        let table = match tx {
            Some(tx) => introspect_table(tx, d.schema(), d.entity_name()).await?,
            None => introspect_table(&self.ctx.conn, d.schema(), d.entity_name()).await?,
        };
        let used = |name: &str| {
            d.keys().iter().chain(d.columns()).chain(d.create_columns()).chain(d.update_columns()).any(|c| c == name)
        };
        Ok(Introspection {
            entity_name: d.entity_name().to_owned(),
            schema: d.schema().map(str::to_owned),
            pascal_name: d.pascal_name().to_owned(),
            label: d.label().to_owned(),
            keys: d.keys().to_vec(),
            select_args: d.select_args().iter().map(ToString::to_string).collect(),
            create_columns: d.create_columns().to_vec(),
            update_columns: d.update_columns().to_vec(),
            uses_joins: !d.joins().is_empty(),
            joins: d.joins().iter().map(crate::join::PreparedJoin::clause).collect(),
            joined_entities: d.joins().iter().map(|j| j.relation_name().to_owned()).collect(),
            columns: table.columns.into_iter().filter(|c| used(&c.name)).collect(),
        })
    }
}

#[async_trait]
impl EntityAction for Introspector {
    fn name(&self) -> &str {
        "introspect"
    }

    async fn invoke(&self, _args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        to_json(self.describe(tx).await?)
    }
}

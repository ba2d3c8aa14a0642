//! Entity descriptors: the immutable configuration every action derives from.

use std::sync::LazyLock;

use figment::Figment;
use heck::{ToTitleCase, ToUpperCamelCase};
use regex::Regex;
use sea_orm::sea_query::{Alias, IntoIden, TableRef};
use serde::{Deserialize, Serialize};

use crate::alias::{AliasMap, SelectArg, SelectColumn, make_select_args};
use crate::error::ActionError;
use crate::filter::ListWhereSpec;
use crate::introspect::TableInfo;
use crate::join::{JoinSpec, PreparedJoin, preprocess_joins};
use crate::record::Record;

#[allow(clippy::expect_used)] // literal pattern
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("static regex should not panic"));

/// An alternate lookup key: one column, or several matched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueColumns {
    Single(String),
    Composite(Vec<String>),
}

impl UniqueColumns {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Single(col) => std::slice::from_ref(col),
            Self::Composite(cols) => cols,
        }
    }
}

/// Caller-facing entity configuration, typically loaded from YAML.
///
/// ```yaml
/// entityName: account
/// schema: main
/// key: [id]
/// selectColumns: [id, email, [person, [[name, personName]]]]
/// createColumns: [email, personId]
/// updateColumns: [email]
/// joins:
///   - [leftJoin, "access.person AS person", person.id, account.personId]
/// uniqueColumns: [email]
/// orderable: [email, personName]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntityConfig {
    pub entity_name: String,
    pub schema: Option<String>,
    /// Defaults to `["id"]`.
    pub key: Vec<String>,
    pub columns: Vec<String>,
    pub select_columns: Vec<SelectColumn>,
    pub create_columns: Vec<String>,
    pub update_columns: Vec<String>,
    pub default_create_args: Record,
    pub default_update_args: Record,
    pub joins: Vec<JoinSpec>,
    pub unique_columns: Vec<UniqueColumns>,
    pub orderable: Vec<String>,
    pub list_page_limit: Option<u64>,
    pub arg_keys_must_match: Vec<String>,
    /// Defaults to `<entityName>List`.
    pub records_key: Option<String>,
    /// Defaults to `isDeleted`.
    pub soft_remove_column: Option<String>,
    pub suggest_value_key: Option<String>,
    pub suggest_label_key: Option<String>,
    pub list_where: Option<ListWhereSpec>,
    /// Masked in logs.
    pub redacted_columns: Vec<String>,
}

impl EntityConfig {
    #[must_use]
    pub fn new(entity_name: &str) -> Self {
        Self {
            entity_name: entity_name.to_owned(),
            ..Self::default()
        }
    }

    /// Extract the config stored under `key` of a figment.
    ///
    /// # Errors
    /// Returns `Config` when the key is missing or malformed.
    pub fn from_figment(figment: &Figment, key: &str) -> Result<Self, ActionError> {
        Ok(figment.extract_inner(key)?)
    }
}

/// Frozen, validated entity description shared by all actions of one entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    entity_name: String,
    schema: Option<String>,
    pascal_name: String,
    label: String,
    keys: Vec<String>,
    columns: Vec<String>,
    create_columns: Vec<String>,
    update_columns: Vec<String>,
    default_create_args: Record,
    default_update_args: Record,
    select_args: Vec<SelectArg>,
    aliases: AliasMap,
    joins: Vec<PreparedJoin>,
    unique_columns: Vec<Vec<String>>,
    orderable: Vec<String>,
    list_page_limit: Option<u64>,
    arg_keys_must_match: Vec<String>,
    records_key: String,
    soft_remove_column: String,
    suggest_value_key: Option<String>,
    suggest_label_key: Option<String>,
    list_where: Option<ListWhereSpec>,
    redacted_columns: Vec<String>,
}

pub(crate) fn check_ident(what: &str, name: &str) -> Result<(), ActionError> {
    if IDENT_RE.is_match(name) {
        Ok(())
    } else {
        Err(ActionError::InvalidDescriptor(format!(
            "{what} must be a plain identifier, got {name:?}"
        )))
    }
}

fn intersect(wanted: Vec<String>, physical: &[String]) -> Vec<String> {
    wanted.into_iter().filter(|c| physical.contains(c)).collect()
}

impl EntityDescriptor {
    /// Validate `config`, merging in introspected table metadata when given.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` for an empty or non-physical key, a bad
    /// entity or schema name, or key columns that are not identifiers.
    pub fn build(config: EntityConfig, table: Option<&TableInfo>) -> Result<Self, ActionError> {
        check_ident("entityName", &config.entity_name)?;
        if let Some(schema) = &config.schema {
            check_ident("schema", schema)?;
        }

        let mut keys = if config.key.is_empty() {
            vec!["id".to_owned()]
        } else {
            config.key
        };
        for key in &keys {
            check_ident("key column", key)?;
        }

        let physical = table.map(TableInfo::column_names).unwrap_or_default();

        if let Some(table) = table {
            let pk = table.primary_key();
            if !pk.is_empty() {
                keys = intersect(keys, &pk);
                if keys.is_empty() {
                    return Err(ActionError::InvalidDescriptor(format!(
                        "none of the configured key columns is part of the primary key of {}",
                        config.entity_name
                    )));
                }
            }
        }

        let columns = if config.columns.is_empty() {
            physical.clone()
        } else {
            config.columns
        };

        let select_columns = if config.select_columns.is_empty() {
            columns.iter().map(|c| SelectColumn::Column(c.clone())).collect()
        } else {
            config.select_columns
        };

        let (create_columns, update_columns) = if physical.is_empty() {
            (config.create_columns, config.update_columns)
        } else {
            (
                intersect(config.create_columns, &physical),
                intersect(config.update_columns, &physical),
            )
        };

        if create_columns.is_empty() {
            tracing::debug!(entity = %config.entity_name, "no create columns configured");
        }

        let select_args = make_select_args(&select_columns, &config.entity_name);
        let aliases = AliasMap::from_select_args(&select_args);
        let joins = preprocess_joins(&config.joins, config.schema.as_deref());

        let records_key = config
            .records_key
            .unwrap_or_else(|| format!("{}List", config.entity_name));

        Ok(Self {
            pascal_name: config.entity_name.to_upper_camel_case(),
            label: config.entity_name.to_title_case(),
            entity_name: config.entity_name,
            schema: config.schema,
            keys,
            columns,
            create_columns,
            update_columns,
            default_create_args: config.default_create_args,
            default_update_args: config.default_update_args,
            select_args,
            aliases,
            joins,
            unique_columns: config
                .unique_columns
                .iter()
                .map(|u| u.columns().to_vec())
                .filter(|cols| !cols.is_empty())
                .collect(),
            orderable: config.orderable,
            list_page_limit: config.list_page_limit,
            arg_keys_must_match: config.arg_keys_must_match,
            records_key,
            soft_remove_column: config
                .soft_remove_column
                .unwrap_or_else(|| "isDeleted".to_owned()),
            suggest_value_key: config.suggest_value_key,
            suggest_label_key: config.suggest_label_key,
            list_where: config.list_where,
            redacted_columns: config.redacted_columns,
        })
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// `accountSetting` -> `AccountSetting`
    #[must_use]
    pub fn pascal_name(&self) -> &str {
        &self.pascal_name
    }

    /// `accountSetting` -> `Account Setting`
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn create_columns(&self) -> &[String] {
        &self.create_columns
    }

    #[must_use]
    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }

    #[must_use]
    pub fn default_create_args(&self) -> &Record {
        &self.default_create_args
    }

    #[must_use]
    pub fn default_update_args(&self) -> &Record {
        &self.default_update_args
    }

    #[must_use]
    pub fn select_args(&self) -> &[SelectArg] {
        &self.select_args
    }

    #[must_use]
    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    #[must_use]
    pub fn joins(&self) -> &[PreparedJoin] {
        &self.joins
    }

    #[must_use]
    pub fn unique_columns(&self) -> &[Vec<String>] {
        &self.unique_columns
    }

    #[must_use]
    pub fn orderable(&self) -> &[String] {
        &self.orderable
    }

    #[must_use]
    pub fn list_page_limit(&self) -> Option<u64> {
        self.list_page_limit
    }

    #[must_use]
    pub fn arg_keys_must_match(&self) -> &[String] {
        &self.arg_keys_must_match
    }

    #[must_use]
    pub fn records_key(&self) -> &str {
        &self.records_key
    }

    #[must_use]
    pub fn soft_remove_column(&self) -> &str {
        &self.soft_remove_column
    }

    #[must_use]
    pub fn suggest_value_key(&self) -> Option<&str> {
        self.suggest_value_key.as_deref()
    }

    #[must_use]
    pub fn suggest_label_key(&self) -> Option<&str> {
        self.suggest_label_key.as_deref()
    }

    #[must_use]
    pub fn list_where(&self) -> Option<&ListWhereSpec> {
        self.list_where.as_ref()
    }

    #[must_use]
    pub fn redacted_columns(&self) -> &[String] {
        &self.redacted_columns
    }

    /// Lower-case label for messages, e.g. `account setting`.
    pub(crate) fn noun(&self) -> String {
        self.label.to_lowercase()
    }

    /// The primary relation, schema-qualified when a schema is configured.
    pub(crate) fn table_ref(&self) -> TableRef {
        let table = Alias::new(&self.entity_name).into_iden();
        match &self.schema {
            Some(schema) => TableRef::SchemaTable(Alias::new(schema).into_iden(), table),
            None => TableRef::Table(table),
        }
    }

    /// Relations a select may reference: the primary one plus every join target.
    pub(crate) fn has_relation(&self, relation: &str) -> bool {
        relation == self.entity_name || self.joins.iter().any(|j| j.relation_name() == relation)
    }
}

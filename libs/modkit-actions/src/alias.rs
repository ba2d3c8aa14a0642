//! Alias algebra: logical (possibly aliased) column names to qualified origins.
//!
//! Joined relations commonly share column names such as `id`, so every column
//! that reaches a predicate or an `ORDER BY` is qualified with its relation.

use std::collections::HashMap;
use std::fmt;

use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One entry of a `selectColumns` list.
///
/// ```yaml
/// selectColumns:
///   - id                       # person.id AS id
///   - [name, personName]       # person.name AS personName
///   - [account, [[id, accountId], email]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectColumn {
    Column(String),
    Aliased(String, String),
    Relation(String, Vec<SelectColumn>),
}

impl SelectColumn {
    #[must_use]
    pub fn column(name: &str) -> Self {
        Self::Column(name.to_owned())
    }

    #[must_use]
    pub fn aliased(column: &str, alias: &str) -> Self {
        Self::Aliased(column.to_owned(), alias.to_owned())
    }

    #[must_use]
    pub fn relation(relation: &str, columns: Vec<SelectColumn>) -> Self {
        Self::Relation(relation.to_owned(), columns)
    }
}

/// A physically qualified column: `relation.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedColumn {
    pub relation: String,
    pub column: String,
}

impl QualifiedColumn {
    #[must_use]
    pub fn new(relation: &str, column: &str) -> Self {
        Self {
            relation: relation.to_owned(),
            column: column.to_owned(),
        }
    }

    #[must_use]
    pub fn expr(&self) -> SimpleExpr {
        Expr::col((Alias::new(&self.relation), Alias::new(&self.column))).into()
    }
}

impl fmt::Display for QualifiedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.column)
    }
}

/// One projection item: `relation.column AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectArg {
    pub origin: QualifiedColumn,
    pub alias: String,
}

impl fmt::Display for SelectArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.origin, self.alias)
    }
}

/// Flatten possibly nested select columns into projection items.
#[must_use]
pub fn make_select_args(columns: &[SelectColumn], relation: &str) -> Vec<SelectArg> {
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        match col {
            SelectColumn::Column(name) => out.push(SelectArg {
                origin: QualifiedColumn::new(relation, name),
                alias: name.clone(),
            }),
            SelectColumn::Aliased(name, alias) => out.push(SelectArg {
                origin: QualifiedColumn::new(relation, name),
                alias: alias.clone(),
            }),
            SelectColumn::Relation(nested, inner) => {
                out.extend(make_select_args(inner, nested));
            }
        }
    }
    out
}

/// `alias -> relation.column`, derived once from the projection.
///
/// Duplicate aliases keep the last registration.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    origins: HashMap<String, QualifiedColumn>,
}

impl AliasMap {
    #[must_use]
    pub fn from_select_args(args: &[SelectArg]) -> Self {
        let origins = args
            .iter()
            .map(|arg| (arg.alias.clone(), arg.origin.clone()))
            .collect();
        Self { origins }
    }

    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&QualifiedColumn> {
        self.origins.get(alias)
    }

    /// Resolve a logical name. Unknown names are taken as columns of `primary`;
    /// the store reports them if they do not exist.
    #[must_use]
    pub fn resolve(&self, name: &str, primary: &str) -> QualifiedColumn {
        self.origins
            .get(name)
            .cloned()
            .unwrap_or_else(|| QualifiedColumn::new(primary, name))
    }

    /// Qualify every key of a `where` record.
    #[must_use]
    pub fn qualify<'a>(
        &self,
        args: &'a Record,
        primary: &str,
    ) -> Vec<(QualifiedColumn, &'a serde_json::Value)> {
        args.iter()
            .map(|(name, value)| (self.resolve(name, primary), value))
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn account_projection() -> Vec<SelectArg> {
        make_select_args(
            &[
                SelectColumn::column("id"),
                SelectColumn::aliased("email", "accountEmail"),
                SelectColumn::relation(
                    "person",
                    vec![
                        SelectColumn::aliased("id", "personId"),
                        SelectColumn::aliased("name", "personName"),
                    ],
                ),
            ],
            "account",
        )
    }

    #[test]
    fn flattens_nested_relations() {
        let rendered: Vec<String> = account_projection().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "account.id AS id",
                "account.email AS accountEmail",
                "person.id AS personId",
                "person.name AS personName",
            ]
        );
    }

    #[test]
    fn resolves_aliases_to_joined_relation() {
        let map = AliasMap::from_select_args(&account_projection());
        assert_eq!(map.resolve("personName", "account").to_string(), "person.name");
        assert_eq!(map.resolve("accountEmail", "account").to_string(), "account.email");
    }

    #[test]
    fn unknown_names_fall_back_to_primary() {
        let map = AliasMap::from_select_args(&account_projection());
        assert_eq!(map.resolve("createdAt", "account").to_string(), "account.createdAt");
    }

    #[test]
    fn last_duplicate_alias_wins() {
        let args = make_select_args(
            &[
                SelectColumn::aliased("name", "label"),
                SelectColumn::relation("person", vec![SelectColumn::aliased("name", "label")]),
            ],
            "account",
        );
        let map = AliasMap::from_select_args(&args);
        assert_eq!(map.resolve("label", "account").to_string(), "person.name");
    }

    #[test]
    fn select_columns_deserialize_from_nested_lists() {
        let cols: Vec<SelectColumn> = serde_json::from_value(json!([
            "id",
            ["email", "accountEmail"],
            ["person", [["name", "personName"], "age"]]
        ]))
        .unwrap();
        assert_eq!(
            cols,
            vec![
                SelectColumn::column("id"),
                SelectColumn::aliased("email", "accountEmail"),
                SelectColumn::relation(
                    "person",
                    vec![SelectColumn::aliased("name", "personName"), SelectColumn::column("age")]
                ),
            ]
        );
    }

    #[test]
    fn qualify_rewrites_where_keys() {
        let map = AliasMap::from_select_args(&account_projection());
        let mut args = Record::new();
        args.insert("personName".to_owned(), json!("Ada"));
        args.insert("id".to_owned(), json!(1));
        let mut qualified: Vec<String> = map
            .qualify(&args, "account")
            .into_iter()
            .map(|(col, _)| col.to_string())
            .collect();
        qualified.sort();
        assert_eq!(qualified, vec!["account.id", "person.name"]);
    }
}

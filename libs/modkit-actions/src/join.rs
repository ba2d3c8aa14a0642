//! Join declarations and their preprocessing into executable joins.
//!
//! Declared as tuples in entity configs:
//!
//! ```yaml
//! joins:
//!   - [leftJoin, "access.person AS person", person.id, account.personId]
//!   - [innerJoin, team, team.createdAt, ">", account.createdAt]
//!   - [join, { owner: access.person }, owner.id, account.ownerId]
//! ```
//!
//! Every declaration is validated when it is parsed or built, so a malformed
//! join fails entity registration and never an individual call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sea_orm::sea_query::{Alias, BinOper, IntoIden, JoinType, SelectStatement, SimpleExpr, TableRef};
use serde::{Deserialize, Serialize};

use crate::alias::QualifiedColumn;
use crate::error::ActionError;

#[allow(clippy::expect_used)] // literal pattern
static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(\w+)\.)?(\w+)(?:\s+as\s+(\w+))?$").expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // literal pattern
static COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\.(\w+)$").expect("static regex should not panic"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Join,
    InnerJoin,
    LeftJoin,
    RightJoin,
    FullOuterJoin,
}

impl JoinKind {
    fn parse(name: &str) -> Result<Self, String> {
        match name {
            "join" => Ok(Self::Join),
            "innerJoin" => Ok(Self::InnerJoin),
            "leftJoin" => Ok(Self::LeftJoin),
            "rightJoin" => Ok(Self::RightJoin),
            "outerJoin" | "fullOuterJoin" => Ok(Self::FullOuterJoin),
            "joinRaw" => Err(
                "raw joins are not supported; declare the target relation and ON columns instead"
                    .to_owned(),
            ),
            other => Err(format!(
                "join kind must be one of join, innerJoin, leftJoin, rightJoin, outerJoin; got {other}"
            )),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::InnerJoin => "innerJoin",
            Self::LeftJoin => "leftJoin",
            Self::RightJoin => "rightJoin",
            Self::FullOuterJoin => "outerJoin",
        }
    }

    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::InnerJoin => "INNER JOIN",
            Self::LeftJoin => "LEFT JOIN",
            Self::RightJoin => "RIGHT JOIN",
            Self::FullOuterJoin => "FULL OUTER JOIN",
        }
    }

    fn join_type(self) -> JoinType {
        match self {
            Self::Join => JoinType::Join,
            Self::InnerJoin => JoinType::InnerJoin,
            Self::LeftJoin => JoinType::LeftJoin,
            Self::RightJoin => JoinType::RightJoin,
            Self::FullOuterJoin => JoinType::FullOuterJoin,
        }
    }
}

/// Comparison in a join's ON clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl JoinOp {
    fn parse(op: &str) -> Result<Self, String> {
        match op {
            "=" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            other => Err(format!("unsupported join operator {other}")),
        }
    }

    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn bin_oper(self) -> BinOper {
        match self {
            Self::Eq => BinOper::Equal,
            Self::Ne => BinOper::NotEqual,
            Self::Lt => BinOper::SmallerThan,
            Self::Lte => BinOper::SmallerThanOrEqual,
            Self::Gt => BinOper::GreaterThan,
            Self::Gte => BinOper::GreaterThanOrEqual,
        }
    }
}

/// The relation being joined: `[schema.]table[ AS alias]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTarget {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl JoinTarget {
    fn parse(expr: &str) -> Result<Self, String> {
        let caps = TARGET_RE
            .captures(expr.trim())
            .ok_or_else(|| format!("join target must read [schema.]table[ AS alias], got {expr}"))?;
        Ok(Self {
            schema: caps.get(1).map(|m| m.as_str().to_owned()),
            table: caps[2].to_owned(),
            alias: caps.get(3).map(|m| m.as_str().to_owned()),
        })
    }

    /// Name the joined columns are qualified with.
    #[must_use]
    pub fn relation_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn table_ref(&self) -> TableRef {
        let table = Alias::new(&self.table).into_iden();
        match (&self.schema, &self.alias) {
            (Some(schema), Some(alias)) => {
                TableRef::SchemaTableAlias(Alias::new(schema).into_iden(), table, Alias::new(alias).into_iden())
            }
            (Some(schema), None) => TableRef::SchemaTable(Alias::new(schema).into_iden(), table),
            (None, Some(alias)) => TableRef::TableAlias(table, Alias::new(alias).into_iden()),
            (None, None) => TableRef::Table(table),
        }
    }
}

impl fmt::Display for JoinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        f.write_str(&self.table)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

fn parse_column(ident: &str) -> Result<QualifiedColumn, String> {
    let caps = COLUMN_RE
        .captures(ident.trim())
        .ok_or_else(|| format!("join columns must read relation.column, got {ident}"))?;
    Ok(QualifiedColumn::new(&caps[1], &caps[2]))
}

/// A validated join declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJoin", into = "RawJoin")]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub left: QualifiedColumn,
    pub op: JoinOp,
    pub right: QualifiedColumn,
}

impl JoinSpec {
    /// Equality join, e.g. `JoinSpec::new("leftJoin", "access.person AS person", "person.id", "account.personId")`.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` when the kind, target or columns are malformed.
    pub fn new(kind: &str, target: &str, left: &str, right: &str) -> Result<Self, ActionError> {
        Self::parse(kind, target, left, "=", right).map_err(ActionError::InvalidDescriptor)
    }

    /// Join with an explicit comparison operator.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` when any part is malformed.
    pub fn with_op(
        kind: &str,
        target: &str,
        left: &str,
        op: &str,
        right: &str,
    ) -> Result<Self, ActionError> {
        Self::parse(kind, target, left, op, right).map_err(ActionError::InvalidDescriptor)
    }

    fn parse(kind: &str, target: &str, left: &str, op: &str, right: &str) -> Result<Self, String> {
        Ok(Self {
            kind: JoinKind::parse(kind)?,
            target: JoinTarget::parse(target)?,
            left: parse_column(left)?,
            op: JoinOp::parse(op)?,
            right: parse_column(right)?,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Expr(String),
    Aliased(BTreeMap<String, String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawJoin {
    WithOp(String, RawTarget, String, String, String),
    Eq(String, RawTarget, String, String),
}

impl TryFrom<RawJoin> for JoinSpec {
    type Error = String;

    fn try_from(raw: RawJoin) -> Result<Self, Self::Error> {
        let (kind, target, left, op, right) = match raw {
            RawJoin::WithOp(kind, target, left, op, right) => (kind, target, left, op, right),
            RawJoin::Eq(kind, target, left, right) => (kind, target, left, "=".to_owned(), right),
        };
        let target = match target {
            RawTarget::Expr(expr) => expr,
            RawTarget::Aliased(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((alias, table)), None) => format!("{table} AS {alias}"),
                    _ => return Err("join target object must have exactly one alias".to_owned()),
                }
            }
        };
        Self::parse(&kind, &target, &left, &op, &right)
    }
}

impl From<JoinSpec> for RawJoin {
    fn from(spec: JoinSpec) -> Self {
        Self::WithOp(
            spec.kind.name().to_owned(),
            RawTarget::Expr(spec.target.to_string()),
            spec.left.to_string(),
            spec.op.sql().to_owned(),
            spec.right.to_string(),
        )
    }
}

/// A join ready to be folded into a select.
#[derive(Debug, Clone)]
pub struct PreparedJoin {
    spec: JoinSpec,
    cross_schema: bool,
}

impl PreparedJoin {
    #[must_use]
    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    #[must_use]
    pub fn relation_name(&self) -> &str {
        self.spec.target.relation_name()
    }

    /// Target lives in a different schema than the primary relation.
    #[must_use]
    pub fn is_cross_schema(&self) -> bool {
        self.cross_schema
    }

    /// SQL text of the clause, e.g. `LEFT JOIN access.person AS person ON person.id = account.personId`.
    #[must_use]
    pub fn clause(&self) -> String {
        format!(
            "{} {} ON {} {} {}",
            self.spec.kind.sql(),
            self.spec.target,
            self.spec.left,
            self.spec.op.sql(),
            self.spec.right
        )
    }

    pub(crate) fn apply(&self, query: &mut SelectStatement) {
        let on = SimpleExpr::Binary(
            Box::new(self.spec.left.expr()),
            self.spec.op.bin_oper(),
            Box::new(self.spec.right.expr()),
        );
        query.join(self.spec.kind.join_type(), self.spec.target.table_ref(), on);
    }
}

/// Prepare joins against a primary relation living in `primary_schema`.
///
/// Targets in another schema are joined through a schema-qualified table
/// reference; same-schema targets keep whatever qualification they declared.
#[must_use]
pub fn preprocess_joins(joins: &[JoinSpec], primary_schema: Option<&str>) -> Vec<PreparedJoin> {
    joins
        .iter()
        .map(|spec| {
            let cross_schema = spec
                .target
                .schema
                .as_deref()
                .is_some_and(|schema| Some(schema) != primary_schema);
            if cross_schema {
                tracing::debug!(target = %spec.target, "cross-schema join");
            }
            PreparedJoin {
                spec: spec.clone(),
                cross_schema,
            }
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::sea_query::{Query, SqliteQueryBuilder};
    use serde_json::json;

    #[test]
    fn parses_tuple_forms() {
        let joins: Vec<JoinSpec> = serde_json::from_value(json!([
            ["leftJoin", "access.person AS person", "person.id", "account.personId"],
            ["innerJoin", "team", "team.createdAt", ">", "account.createdAt"],
            ["join", {"owner": "access.person"}, "owner.id", "account.ownerId"]
        ]))
        .unwrap();

        assert_eq!(joins[0].kind, JoinKind::LeftJoin);
        assert_eq!(joins[0].target.schema.as_deref(), Some("access"));
        assert_eq!(joins[0].target.relation_name(), "person");
        assert_eq!(joins[1].op, JoinOp::Gt);
        assert_eq!(joins[1].target.relation_name(), "team");
        assert_eq!(joins[2].target.to_string(), "access.person AS owner");
    }

    #[test]
    fn rejects_unknown_kind_and_raw_joins() {
        let bad = serde_json::from_value::<JoinSpec>(json!(["crossApply", "team", "team.id", "a.teamId"]));
        assert!(bad.is_err());

        let raw = JoinSpec::new("joinRaw", "team", "team.id", "a.teamId");
        assert!(matches!(raw, Err(ActionError::InvalidDescriptor(_))));
    }

    #[test]
    fn rejects_unqualified_columns_and_bad_targets() {
        assert!(JoinSpec::new("join", "team", "id", "account.teamId").is_err());
        assert!(JoinSpec::new("join", "a.b.c", "team.id", "account.teamId").is_err());
        assert!(JoinSpec::with_op("join", "team", "team.id", "~", "account.teamId").is_err());
    }

    #[test]
    fn rewrites_cross_schema_clause() {
        let join =
            JoinSpec::new("leftJoin", "access.person AS person", "person.id", "account.personId").unwrap();
        let prepared = preprocess_joins(&[join], Some("public"));
        assert!(prepared[0].is_cross_schema());
        assert_eq!(
            prepared[0].clause(),
            "LEFT JOIN access.person AS person ON person.id = account.personId"
        );
    }

    #[test]
    fn same_schema_is_not_cross_schema() {
        let same = JoinSpec::new("join", "main.team", "team.id", "account.teamId").unwrap();
        let bare = JoinSpec::new("join", "team", "team.id", "account.teamId").unwrap();
        let prepared = preprocess_joins(&[same, bare], Some("main"));
        assert!(!prepared[0].is_cross_schema());
        assert!(!prepared[1].is_cross_schema());
    }

    #[test]
    fn applies_qualified_join_to_select() {
        let join =
            JoinSpec::new("leftJoin", "access.person AS person", "person.id", "account.personId").unwrap();
        let prepared = preprocess_joins(&[join], None);
        let mut q = Query::select();
        q.column(sea_orm::sea_query::Asterisk).from(Alias::new("account"));
        prepared[0].apply(&mut q);
        let sql = q.to_string(SqliteQueryBuilder);
        assert!(
            sql.contains(r#"LEFT JOIN "access"."person" AS "person" ON "person"."id" = "account"."personId""#),
            "{sql}"
        );
    }

    #[test]
    fn serializes_back_to_tuple() {
        let join = JoinSpec::with_op("innerJoin", "team", "team.createdAt", ">", "account.createdAt").unwrap();
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!(["innerJoin", "team", "team.createdAt", ">", "account.createdAt"])
        );
    }
}

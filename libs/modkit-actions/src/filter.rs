//! Declarative list filters.
//!
//! ```yaml
//! listWhere:
//!   like: [name]                  # name LIKE 'value%'
//!   equals: [[personId, owner]]   # personId = args.owner
//!   oneOf: [status]               # status IN ('a', 'b') from "a,b" or ["a", "b"]
//!   dateRange: [createdAt]        # createdAt >= args.createdAtStart AND <= args.createdAtEnd
//! ```

use sea_orm::sea_query::{Condition, Expr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alias::AliasMap;
use crate::record::{Record, sql_value};

/// A filtered column, optionally read from a differently named argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterField {
    Same(String),
    /// `[column, argName]`
    Mapped(String, String),
}

impl FilterField {
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Same(name) | Self::Mapped(name, _) => name,
        }
    }

    #[must_use]
    pub fn arg(&self) -> &str {
        match self {
            Self::Same(name) | Self::Mapped(_, name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListWhereSpec {
    pub like: Vec<FilterField>,
    pub equals: Vec<FilterField>,
    pub one_of: Vec<FilterField>,
    pub date_range: Vec<FilterField>,
}

fn present<'a>(args: &'a Record, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

fn like_pattern(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s}%"),
        other => format!("{other}%"),
    }
}

fn one_of_values(value: &Value) -> Vec<sea_orm::sea_query::Value> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(|part| sea_orm::sea_query::Value::from(part.trim().to_owned()))
            .collect(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(sql_value).collect(),
        other => vec![sql_value(other)],
    }
}

impl ListWhereSpec {
    /// Compile against one request. Absent arguments add nothing.
    #[must_use]
    pub fn condition(&self, args: &Record, aliases: &AliasMap, primary: &str) -> Condition {
        let mut cond = Condition::all();
        for field in &self.like {
            if let Some(v) = present(args, field.arg()) {
                let col = aliases.resolve(field.column(), primary);
                cond = cond.add(Expr::expr(col.expr()).like(like_pattern(v)));
            }
        }
        for field in &self.equals {
            if let Some(v) = present(args, field.arg()) {
                let col = aliases.resolve(field.column(), primary);
                cond = cond.add(Expr::expr(col.expr()).eq(sql_value(v)));
            }
        }
        for field in &self.one_of {
            if let Some(v) = present(args, field.arg()) {
                let col = aliases.resolve(field.column(), primary);
                cond = cond.add(Expr::expr(col.expr()).is_in(one_of_values(v)));
            }
        }
        for field in &self.date_range {
            let col = aliases.resolve(field.column(), primary);
            if let Some(start) = present(args, &format!("{}Start", field.arg())) {
                cond = cond.add(Expr::expr(col.expr()).gte(sql_value(start)));
            }
            if let Some(end) = present(args, &format!("{}End", field.arg())) {
                cond = cond.add(Expr::expr(col.expr()).lte(sql_value(end)));
            }
        }
        cond
    }

    /// Argument names this spec reads, for routing layers deriving query params.
    #[must_use]
    pub fn arg_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .like
            .iter()
            .chain(&self.equals)
            .chain(&self.one_of)
            .map(|f| f.arg().to_owned())
            .collect();
        for field in &self.date_range {
            names.push(format!("{}Start", field.arg()));
            names.push(format!("{}End", field.arg()));
        }
        names
    }
}
